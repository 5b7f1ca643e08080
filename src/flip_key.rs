//! Flip decryption keys.
//!
//! After the answer window of a validation session closes, every identity
//! that authored flips publishes the key that decrypts them. A flip key is
//! signed by the identity's signing key; the sender address is recovered by
//! verifying that signature, never trusted from the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::{Signature, SigningKeypair, SigningPublicKey};
use crate::{Address, Hash};

/// Content hash of a flip key, used for exact-duplicate detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlipKeyHash(pub Hash);

impl fmt::Display for FlipKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FlipKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlipKeyHash({})", hex::encode(&self.0[..8]))
    }
}

/// Errors recovering the sender of a flip key.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FlipKeyError {
    #[error("flip key carries a malformed signing public key")]
    InvalidPublicKey,
    #[error("flip key signature does not verify")]
    InvalidSignature,
}

/// A published flip decryption key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipKey {
    /// Opaque key material.
    pub key: Vec<u8>,
    /// Epoch the key was published for (prevents cross-epoch replay).
    pub epoch: u16,
    /// Signing key of the publishing identity.
    pub public_key: SigningPublicKey,
    /// Signature over `sign_data(key, epoch)`.
    pub signature: Signature,
}

impl FlipKey {
    /// Build and sign a flip key for `epoch`.
    pub fn new_signed(key: Vec<u8>, epoch: u16, keypair: &SigningKeypair) -> Self {
        let signature = keypair.sign(&Self::sign_data(&key, epoch));
        FlipKey {
            key,
            epoch,
            public_key: keypair.public.clone(),
            signature,
        }
    }

    /// The message an identity signs when publishing a flip key.
    pub fn sign_data(key: &[u8], epoch: u16) -> Hash {
        crate::hash_concat(&[b"flipchain.flipkey.sign", key, &epoch.to_le_bytes()])
    }

    /// Content hash over every field, signature included.
    pub fn hash(&self) -> FlipKeyHash {
        FlipKeyHash(crate::hash_concat(&[
            b"flipchain.flipkey",
            self.key.as_slice(),
            &self.epoch.to_le_bytes(),
            self.public_key.as_bytes(),
            self.signature.as_bytes(),
        ]))
    }

    /// Recover the publishing identity by verifying the signature.
    pub fn sender(&self) -> Result<Address, FlipKeyError> {
        if !self.public_key.is_valid_size() {
            return Err(FlipKeyError::InvalidPublicKey);
        }
        let msg = Self::sign_data(&self.key, self.epoch);
        if !self.public_key.verify(&msg, &self.signature) {
            return Err(FlipKeyError::InvalidSignature);
        }
        Ok(self.public_key.address())
    }
}
