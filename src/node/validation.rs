//! State validation for flip keys.
//!
//! The keys pool does not know chain state. It asks a [`StateValidator`]
//! whether a key is admissible against the epoch head it was initialized
//! with. [`IdentityStateValidator`] is the in-memory implementation used by
//! the node: it checks the key against the identity table materialized at
//! that head.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::flip_key::{FlipKey, FlipKeyError};
use crate::{Address, Hash};

/// The chain head an epoch's flip keys are validated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochHead {
    pub height: u64,
    pub hash: Hash,
    pub epoch: u16,
}

/// Lifecycle state of an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityState {
    Undefined,
    Invite,
    Candidate,
    Verified,
    Suspended,
    Killed,
    Zombie,
    Newbie,
    Human,
}

impl IdentityState {
    /// Whether an identity in this state takes part in validation and so
    /// publishes a flip key.
    pub fn participates_in_validation(self) -> bool {
        matches!(
            self,
            IdentityState::Candidate
                | IdentityState::Newbie
                | IdentityState::Verified
                | IdentityState::Suspended
                | IdentityState::Zombie
                | IdentityState::Human
        )
    }
}

/// Reasons a flip key is not admissible.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyValidationError {
    #[error("sender recovery failed: {0}")]
    Sender(#[from] FlipKeyError),
    #[error("flip key is for epoch {actual}, current epoch is {expected}")]
    WrongEpoch { expected: u16, actual: u16 },
    #[error("flip key material is empty")]
    EmptyKey,
    #[error("flip key material is {size} bytes, max {max}")]
    KeyTooLarge { size: usize, max: usize },
    #[error("sender {0} is not a known identity")]
    UnknownIdentity(Address),
    #[error("sender {address} is {state:?} and does not take part in validation")]
    NotParticipating {
        address: Address,
        state: IdentityState,
    },
}

/// Decides whether a flip key is admissible at a given epoch head.
///
/// Called under the keys pool lock, so implementations must be fast,
/// synchronous checks against already-materialized state.
pub trait StateValidator: Send + Sync {
    fn validate_flip_key(
        &self,
        head: &EpochHead,
        key: &FlipKey,
        sender: &Address,
    ) -> Result<(), KeyValidationError>;
}

/// Validator backed by an in-memory identity state table.
pub struct IdentityStateValidator {
    max_key_bytes: usize,
    identities: RwLock<HashMap<Address, IdentityState>>,
}

impl IdentityStateValidator {
    pub fn new(max_key_bytes: usize) -> Self {
        IdentityStateValidator {
            max_key_bytes,
            identities: RwLock::new(HashMap::new()),
        }
    }

    /// Validator with the default key size limit.
    pub fn with_defaults() -> Self {
        Self::new(crate::constants::MAX_FLIP_KEY_BYTES)
    }

    /// Record the state of an identity.
    pub fn set_state(&self, address: Address, state: IdentityState) {
        self.identities.write().insert(address, state);
    }

    /// Replace the whole identity table, e.g. after applying an epoch's
    /// validation results.
    pub fn replace_states(&self, states: HashMap<Address, IdentityState>) {
        *self.identities.write() = states;
    }

    pub fn state(&self, address: &Address) -> Option<IdentityState> {
        self.identities.read().get(address).copied()
    }

    /// Number of identities participating in validation.
    pub fn network_size(&self) -> usize {
        self.identities
            .read()
            .values()
            .filter(|s| s.participates_in_validation())
            .count()
    }
}

impl Default for IdentityStateValidator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StateValidator for IdentityStateValidator {
    fn validate_flip_key(
        &self,
        head: &EpochHead,
        key: &FlipKey,
        sender: &Address,
    ) -> Result<(), KeyValidationError> {
        if key.epoch != head.epoch {
            return Err(KeyValidationError::WrongEpoch {
                expected: head.epoch,
                actual: key.epoch,
            });
        }
        if key.key.is_empty() {
            return Err(KeyValidationError::EmptyKey);
        }
        if key.key.len() > self.max_key_bytes {
            return Err(KeyValidationError::KeyTooLarge {
                size: key.key.len(),
                max: self.max_key_bytes,
            });
        }
        match self.state(sender) {
            None => Err(KeyValidationError::UnknownIdentity(*sender)),
            Some(state) if !state.participates_in_validation() => {
                Err(KeyValidationError::NotParticipating {
                    address: *sender,
                    state,
                })
            }
            Some(_) => Ok(()),
        }
    }
}
