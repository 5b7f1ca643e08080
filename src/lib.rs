//! # Flipchain
//!
//! Epoch-level building blocks of a proof-of-person chain:
//! - **Flip key admission**: a concurrency-safe pool that collects the flip
//!   decryption keys identities publish after the answer window closes,
//!   deduplicated by content hash and by sender
//! - **Network parameters**: deterministic session sizing and epoch length
//!   derived from the current network population
//! - **Identity scores**: the one-byte packed per-epoch score and the decayed
//!   cumulative score folded from a bounded score history

pub mod config;
pub mod crypto;
pub mod demo;
pub mod flip_key;
pub mod node;
pub mod params;
pub mod score;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol constants
pub mod constants {
    /// Flips shown to every identity in the short session
    pub const SHORT_SESSION_FLIPS: u32 = 6;
    /// Extra flips shown in the short session on top of `SHORT_SESSION_FLIPS`
    pub const SHORT_SESSION_EXTRA_FLIPS: u32 = 2;
    /// Number of testers each flip is assigned to in the long session.
    /// Caps the long session flip count at `flips_per_identity * LONG_SESSION_TESTERS`.
    pub const LONG_SESSION_TESTERS: u32 = 10;
    /// Lower bound on the long session flip count, even for tiny networks.
    pub const MIN_LONG_SESSION_FLIPS: u32 = 5;
    /// Flips every identity must author per epoch.
    ///
    /// Constant regardless of network size; `long_session_flips_count` still
    /// multiplies it by the network size.
    pub const FLIPS_PER_IDENTITY: u32 = 3;

    /// Minimum total score ratio for an identity to stay verified
    pub const MIN_TOTAL_SCORE: f32 = 0.75;
    /// Minimum total score ratio for the human status
    pub const MIN_HUMAN_TOTAL_SCORE: f32 = 0.92;
    /// Minimum cumulative flips before the verified status is granted
    pub const MIN_FLIPS_FOR_VERIFIED: u32 = 13;
    /// Minimum cumulative flips before the human status is granted
    pub const MIN_FLIPS_FOR_HUMAN: u32 = 24;
    /// Number of packed epoch scores kept per identity.
    ///
    /// Score aggregation relies on history never exceeding this length so the
    /// decay multiplier `1 - 0.1 * len` stays in `[0, 1]`.
    pub const LAST_SCORES_COUNT: usize = 10;

    /// Epoch length (days) from which the duration snaps to whole weeks
    pub const LONG_EPOCH_THRESHOLD_DAYS: i64 = 21;
    /// Epoch length used for long epochs that do not end on the snap weekday
    pub const OFF_WEEKDAY_EPOCH_DAYS: i64 = 20;
    /// Upper bound on a snapped epoch length
    pub const MAX_EPOCH_DAYS: i64 = 28;

    /// Invite quota bounds for the god address
    pub const MIN_INVITE_QUOTA: usize = 50;
    pub const MAX_INVITE_QUOTA: usize = 500;

    /// Maximum flip key material accepted by the default validator (bytes)
    pub const MAX_FLIP_KEY_BYTES: usize = 1024;
    /// Capacity of the node event channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
    /// Maximum accepted wire payload (1 MiB)
    pub const MAX_NETWORK_MESSAGE_BYTES: usize = 1024 * 1024;
}

/// 32-byte hash used throughout the protocol
pub type Hash = [u8; 32];

/// Length of an identity address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// A network participant's identity reference.
///
/// Derived from the identity's signing public key, see
/// [`crypto::keys::SigningPublicKey::address`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    /// Build an address from the leading bytes of a hash.
    pub fn from_hash(hash: &Hash) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash[..ADDRESS_LENGTH]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Compute a domain-separated BLAKE3 hash.
///
/// The domain MUST be valid UTF-8 (all flipchain domains are ASCII literals).
/// Panics at runtime if domain is not valid UTF-8, which is a programming error.
pub fn hash_domain(domain: &[u8], data: &[u8]) -> Hash {
    let domain_str = std::str::from_utf8(domain).expect("hash_domain: domain must be valid UTF-8");
    let mut hasher = blake3::Hasher::new_derive_key(domain_str);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Compute BLAKE3 hash of length-prefixed concatenated slices.
///
/// Each part is prefixed with its length as a little-endian u64, preventing
/// ambiguous concatenation (e.g., `["AB","C"]` vs `["A","BC"]`).
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Serialize a value using bincode with legacy (v1-compatible) encoding.
pub fn serialize<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, bincode::error::EncodeError> {
    bincode::serde::encode_to_vec(val, bincode::config::legacy())
}

/// Deserialize a value using bincode with legacy (v1-compatible) encoding.
///
/// Rejects inputs larger than `MAX_NETWORK_MESSAGE_BYTES` to prevent OOM
/// from oversized payloads relayed by peers.
pub fn deserialize<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, bincode::error::DecodeError> {
    if bytes.len() > constants::MAX_NETWORK_MESSAGE_BYTES {
        return Err(bincode::error::DecodeError::LimitExceeded);
    }
    let (val, _len) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
    Ok(val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_domain_deterministic() {
        let a = hash_domain(b"flipchain.test", b"hello");
        let b = hash_domain(b"flipchain.test", b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_domain_different_domains() {
        let a = hash_domain(b"flipchain.domain_a", b"data");
        let b = hash_domain(b"flipchain.domain_b", b"data");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_concat_length_prefix_prevents_ambiguity() {
        let ab_c = hash_concat(&[b"ab", b"c"]);
        let a_bc = hash_concat(&[b"a", b"bc"]);
        assert_ne!(ab_c, a_bc);
    }

    #[test]
    fn address_from_hash_takes_leading_bytes() {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        let addr = Address::from_hash(&hash);
        assert_eq!(addr.as_bytes(), &hash[..ADDRESS_LENGTH]);
    }

    #[test]
    fn address_display_is_prefixed_hex() {
        let addr = Address([0xab; ADDRESS_LENGTH]);
        let s = addr.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 2 + ADDRESS_LENGTH * 2);
        assert_eq!(format!("{:?}", addr), format!("Address({})", s));
    }

    #[test]
    fn deserialize_rejects_oversized_input() {
        let oversized = vec![0u8; constants::MAX_NETWORK_MESSAGE_BYTES + 1];
        let result = deserialize::<Vec<u8>>(&oversized);
        assert!(result.is_err(), "oversized input should be rejected");
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let original: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = serialize(&original).unwrap();
        let restored: Vec<u8> = deserialize(&bytes).unwrap();
        assert_eq!(original, restored);
    }
}
