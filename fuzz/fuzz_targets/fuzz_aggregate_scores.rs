#![no_main]

use flipchain::constants::LAST_SCORES_COUNT;
use flipchain::score::{aggregate_scores, decode_score, encode_score};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Layout: 4 bytes prior points (f32 LE), 4 bytes prior flips (u32 LE),
    // then the packed history. Aggregation must never panic, whatever the
    // prior total or history length.
    if data.len() < 8 {
        return;
    }
    let prior_points = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let prior_flips = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let history = &data[8..];
    let _ = aggregate_scores(history, prior_points, prior_flips);

    for &byte in history.iter().take(LAST_SCORES_COUNT) {
        let (points, flips) = decode_score(byte);
        assert_eq!(encode_score(points, flips), byte);
    }
});
