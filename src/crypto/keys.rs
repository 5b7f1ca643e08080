//! Identity signing keys using CRYSTALS-Dilithium5.
//!
//! An identity signs the flip keys it publishes; the signing public key
//! travels with the flip key and the sender's [`Address`] is derived from it.

use pqcrypto_dilithium::dilithium5;
use pqcrypto_traits::sign::{
    DetachedSignature as SigTrait, PublicKey as SignPkTrait, SecretKey as SignSkTrait,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Address, Hash};

/// A CRYSTALS-Dilithium5 signing public key.
///
/// Inner bytes are `pub(crate)` to prevent external construction of
/// unvalidated keys. Use [`SigningKeypair::generate`] or deserialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningPublicKey(pub(crate) Vec<u8>);

/// A CRYSTALS-Dilithium5 signing secret key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecretKey(pub(crate) Vec<u8>);

/// A Dilithium5 detached signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub(crate) Vec<u8>);

impl Signature {
    /// An empty signature. Never verifies.
    pub fn empty() -> Self {
        Signature(vec![])
    }

    /// Access the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.0, s)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(d)?;
        // Empty is allowed (it simply fails verification); anything else must
        // have the exact Dilithium5 length.
        let expected = dilithium5::signature_bytes();
        if !bytes.is_empty() && bytes.len() != expected {
            return Err(serde::de::Error::custom(format!(
                "invalid Dilithium5 signature: expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
        Ok(Signature(bytes))
    }
}

/// A Dilithium5 signing keypair held by an identity.
#[derive(Clone)]
pub struct SigningKeypair {
    pub public: SigningPublicKey,
    pub secret: SigningSecretKey,
}

impl SigningKeypair {
    /// Generate a new random Dilithium5 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium5::keypair();
        SigningKeypair {
            public: SigningPublicKey(pk.as_bytes().to_vec()),
            secret: SigningSecretKey(sk.as_bytes().to_vec()),
        }
    }

    /// Sign a message, producing a detached signature.
    ///
    /// A corrupted secret key is logged and yields an empty signature, which
    /// always fails verification.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sk = match dilithium5::SecretKey::from_bytes(&self.secret.0) {
            Ok(sk) => sk,
            Err(_) => {
                tracing::error!("SigningKeypair::sign called with corrupted secret key");
                return Signature::empty();
            }
        };
        let sig = dilithium5::detached_sign(message, &sk);
        Signature(sig.as_bytes().to_vec())
    }

    /// The identity address of this keypair.
    pub fn address(&self) -> Address {
        self.public.address()
    }
}

impl SigningPublicKey {
    /// Access the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verify a detached signature against this public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let pk = match dilithium5::PublicKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = match dilithium5::DetachedSignature::from_bytes(&signature.0) {
            Ok(s) => s,
            Err(_) => return false,
        };
        dilithium5::verify_detached_signature(&sig, message, &pk).is_ok()
    }

    /// BLAKE3 fingerprint of the public key.
    pub fn fingerprint(&self) -> Hash {
        crate::hash_domain(b"flipchain.signing.fingerprint", &self.0)
    }

    /// The identity address owning this key: leading bytes of the fingerprint.
    pub fn address(&self) -> Address {
        Address::from_hash(&self.fingerprint())
    }

    /// Check if this public key has the correct size.
    pub fn is_valid_size(&self) -> bool {
        self.0.len() == dilithium5::public_key_bytes()
    }
}

impl Serialize for SigningPublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.0, s)
    }
}

impl<'de> Deserialize<'de> for SigningPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(d)?;
        let expected = dilithium5::public_key_bytes();
        if bytes.len() != expected {
            return Err(serde::de::Error::custom(format!(
                "invalid Dilithium5 public key: expected {} bytes, got {}",
                expected,
                bytes.len()
            )));
        }
        Ok(SigningPublicKey(bytes))
    }
}
