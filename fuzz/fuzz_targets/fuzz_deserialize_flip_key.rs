#![no_main]

use flipchain::flip_key::FlipKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Flip keys arrive from peers as bincode. Decoding, hashing and sender
    // recovery must never panic on arbitrary input.
    if let Ok(key) = flipchain::deserialize::<FlipKey>(data) {
        let _ = key.hash();
        let _ = key.sender();
    }
});
