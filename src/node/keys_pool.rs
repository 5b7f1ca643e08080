//! Flip key pool with per-epoch hash and sender deduplication.
//!
//! Holds the flip decryption keys published after an epoch's answer window.
//! Each identity may have at most one admitted key per epoch, and a key whose
//! exact content was already seen is rejected. The pool is bound to the epoch
//! head via [`KeysPool::initialize`], read in full at the end of the epoch and
//! then cleared for the next one.
//!
//! All state sits behind a single mutex, so the head, the known-hash set and
//! the sender map are always observed together. Admission events are
//! published while that mutex is held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::flip_key::{FlipKey, FlipKeyHash};
use crate::node::events::{EventSink, NodeEvent};
use crate::node::validation::{EpochHead, KeyValidationError, StateValidator};
use crate::Address;

/// Errors from keys pool admission.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeysPoolError {
    #[error("flip key with the same hash already exists")]
    DuplicateKey,
    #[error("sender {0} has already published a flip key")]
    DuplicateSender(Address),
    #[error("flip key is not valid: {0}")]
    InvalidKey(#[from] KeyValidationError),
    #[error("keys pool has no epoch head")]
    NotInitialized,
}

/// Summary statistics for RPC reporting.
#[derive(Clone, Debug, Serialize)]
pub struct KeysPoolStats {
    pub key_count: usize,
    pub known_hashes: usize,
    pub head_height: Option<u64>,
    pub epoch: Option<u16>,
}

#[derive(Default)]
struct PoolState {
    /// Head the current epoch validates against.
    head: Option<EpochHead>,
    /// Hashes of every key admitted this epoch.
    known_keys: HashSet<FlipKeyHash>,
    /// Admitted key per sender.
    flip_keys: HashMap<Address, Arc<FlipKey>>,
}

/// Epoch-scoped pool of admitted flip keys.
///
/// Shared by reference (`Arc<KeysPool>`) between the message handlers that
/// submit keys and the epoch driver that reads and clears them.
pub struct KeysPool {
    validator: Arc<dyn StateValidator>,
    events: Arc<dyn EventSink>,
    state: Mutex<PoolState>,
}

impl KeysPool {
    pub fn new(validator: Arc<dyn StateValidator>, events: Arc<dyn EventSink>) -> Self {
        KeysPool {
            validator,
            events,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Bind the pool to the head the current epoch validates against.
    pub fn initialize(&self, head: EpochHead) {
        tracing::debug!(
            "Keys pool initialized at height {} (epoch {})",
            head.height,
            head.epoch
        );
        self.state.lock().head = Some(head);
    }

    /// The head the pool currently validates against.
    pub fn head(&self) -> Option<EpochHead> {
        self.state.lock().head
    }

    /// Admit a flip key.
    ///
    /// Rejects keys whose hash was already seen this epoch, keys from a
    /// sender that already has an admitted key, and keys the state validator
    /// refuses. On success a [`NodeEvent::NewFlipKey`] is published.
    pub fn add(&self, key: FlipKey) -> Result<(), KeysPoolError> {
        // Pure functions of the key, computed outside the lock.
        let hash = key.hash();
        let sender = key.sender().map_err(KeyValidationError::from);

        let key = Arc::new(key);
        {
            let mut state = self.state.lock();
            let head = state.head.ok_or(KeysPoolError::NotInitialized)?;

            // 1. Duplicate content
            if state.known_keys.contains(&hash) {
                tracing::debug!("Rejected flip key {}: duplicate hash", hash);
                return Err(KeysPoolError::DuplicateKey);
            }

            let sender = match sender {
                Ok(sender) => sender,
                Err(e) => {
                    tracing::warn!("Flip key {} is not valid: {}", hash, e);
                    return Err(e.into());
                }
            };

            // 2. One key per sender
            if state.flip_keys.contains_key(&sender) {
                tracing::debug!("Rejected flip key {}: sender {} already published", hash, sender);
                return Err(KeysPoolError::DuplicateSender(sender));
            }

            // 3. State validation against the epoch head
            if let Err(e) = self.validator.validate_flip_key(&head, &key, &sender) {
                tracing::warn!("Flip key {} is not valid: {}", hash, e);
                return Err(e.into());
            }

            // 4. Admit, announcing before the lock is released so no rollover
            // can drain the key ahead of its event.
            state.known_keys.insert(hash);
            state.flip_keys.insert(sender, Arc::clone(&key));
            tracing::debug!("Admitted flip key {} from {}", hash, sender);
            self.events.publish(NodeEvent::NewFlipKey(key));
        }
        Ok(())
    }

    /// Snapshot of all admitted keys, in no particular order.
    pub fn get_flip_keys(&self) -> Vec<Arc<FlipKey>> {
        self.state.lock().flip_keys.values().cloned().collect()
    }

    /// The admitted key of `address`, if any.
    pub fn get_flip_key(&self, address: &Address) -> Option<Arc<FlipKey>> {
        self.state.lock().flip_keys.get(address).cloned()
    }

    /// Whether `address` already has an admitted key.
    pub fn contains_sender(&self, address: &Address) -> bool {
        self.state.lock().flip_keys.contains_key(address)
    }

    /// Drop every key and every known hash. The epoch head is kept until the
    /// next [`initialize`](Self::initialize).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.flip_keys.len();
        state.known_keys = HashSet::new();
        state.flip_keys = HashMap::new();
        tracing::debug!("Keys pool cleared ({} keys dropped)", dropped);
    }

    /// Close the epoch: take every admitted key, clear the pool and bind it
    /// to `next_head`, all under one lock so no admission falls in between.
    pub fn rollover(&self, next_head: EpochHead) -> Vec<Arc<FlipKey>> {
        let mut state = self.state.lock();
        let keys: Vec<Arc<FlipKey>> = state.flip_keys.drain().map(|(_, key)| key).collect();
        state.known_keys = HashSet::new();
        state.head = Some(next_head);
        tracing::info!(
            epoch = next_head.epoch,
            height = next_head.height,
            keys = keys.len(),
            "Keys pool rolled over"
        );
        keys
    }

    /// Number of admitted keys.
    pub fn len(&self) -> usize {
        self.state.lock().flip_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().flip_keys.is_empty()
    }

    /// Stats for RPC reporting.
    pub fn stats(&self) -> KeysPoolStats {
        let state = self.state.lock();
        KeysPoolStats {
            key_count: state.flip_keys.len(),
            known_hashes: state.known_keys.len(),
            head_height: state.head.map(|h| h.height),
            epoch: state.head.map(|h| h.epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    use crate::crypto::keys::{Signature, SigningKeypair};
    use crate::node::events::ChannelEventSink;
    use crate::node::validation::{IdentityState, IdentityStateValidator};

    const EPOCH: u16 = 4;

    fn test_head() -> EpochHead {
        EpochHead {
            height: 1_000,
            hash: crate::hash_domain(b"test", b"head"),
            epoch: EPOCH,
        }
    }

    /// Accepts every key.
    struct AcceptAll;

    impl StateValidator for AcceptAll {
        fn validate_flip_key(
            &self,
            _head: &EpochHead,
            _key: &FlipKey,
            _sender: &Address,
        ) -> Result<(), KeyValidationError> {
            Ok(())
        }
    }

    fn make_pool() -> (KeysPool, tokio::sync::mpsc::Receiver<NodeEvent>) {
        let (sink, rx) = ChannelEventSink::new(64);
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        pool.initialize(test_head());
        (pool, rx)
    }

    #[test]
    fn add_and_retrieve() {
        let (pool, _rx) = make_pool();
        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![1; 32], EPOCH, &kp);

        assert_eq!(pool.add(key.clone()), Ok(()));
        assert_eq!(pool.len(), 1);
        assert!(pool.contains_sender(&kp.address()));
        assert_eq!(pool.get_flip_key(&kp.address()).as_deref(), Some(&key));
        assert_eq!(pool.get_flip_keys().len(), 1);
    }

    #[test]
    fn reject_duplicate_hash() {
        let (pool, _rx) = make_pool();
        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![2; 32], EPOCH, &kp);

        assert!(pool.add(key.clone()).is_ok());
        assert_eq!(pool.add(key), Err(KeysPoolError::DuplicateKey));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn reject_duplicate_sender() {
        let (pool, _rx) = make_pool();
        let kp = SigningKeypair::generate();
        let first = FlipKey::new_signed(vec![3; 32], EPOCH, &kp);
        let second = FlipKey::new_signed(vec![4; 32], EPOCH, &kp);
        assert_ne!(first.hash(), second.hash());

        assert!(pool.add(first.clone()).is_ok());
        assert_eq!(
            pool.add(second),
            Err(KeysPoolError::DuplicateSender(kp.address()))
        );
        assert_eq!(pool.get_flip_key(&kp.address()).as_deref(), Some(&first));
    }

    #[test]
    fn reject_before_initialize() {
        let (sink, _rx) = ChannelEventSink::new(4);
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![1], EPOCH, &kp);
        assert_eq!(pool.add(key), Err(KeysPoolError::NotInitialized));
        assert!(pool.is_empty());
    }

    #[test]
    fn reject_bad_signature() {
        let (pool, _rx) = make_pool();
        let kp = SigningKeypair::generate();
        let mut key = FlipKey::new_signed(vec![5; 32], EPOCH, &kp);
        key.signature = Signature::empty();

        match pool.add(key) {
            Err(KeysPoolError::InvalidKey(KeyValidationError::Sender(_))) => {}
            other => panic!("expected InvalidKey(Sender), got {:?}", other),
        }
        assert!(pool.is_empty());
        assert_eq!(pool.stats().known_hashes, 0);
    }

    #[test]
    fn validator_rejection_leaves_pool_unchanged() {
        let (sink, mut rx) = ChannelEventSink::new(4);
        let validator = Arc::new(IdentityStateValidator::with_defaults());
        let pool = KeysPool::new(validator.clone(), Arc::new(sink));
        pool.initialize(test_head());

        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![6; 32], EPOCH, &kp);
        assert_eq!(
            pool.add(key.clone()),
            Err(KeysPoolError::InvalidKey(
                KeyValidationError::UnknownIdentity(kp.address())
            ))
        );
        assert!(pool.is_empty());
        assert!(rx.try_recv().is_err());

        // The rejected content is not remembered: once the identity becomes
        // eligible the same key is admitted.
        validator.set_state(kp.address(), IdentityState::Candidate);
        assert_eq!(pool.add(key), Ok(()));
    }

    #[test]
    fn publishes_event_per_admission() {
        let (pool, mut rx) = make_pool();
        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![7; 32], EPOCH, &kp);

        pool.add(key.clone()).unwrap();
        let _ = pool.add(key.clone());

        match rx.try_recv() {
            Ok(NodeEvent::NewFlipKey(published)) => assert_eq!(*published, key),
            other => panic!("expected NewFlipKey, got {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "rejected add must not publish");
    }

    #[test]
    fn clear_resets_hashes_and_senders() {
        let (pool, _rx) = make_pool();
        let kp = SigningKeypair::generate();
        let first = FlipKey::new_signed(vec![8; 32], EPOCH, &kp);
        let second = FlipKey::new_signed(vec![9; 32], EPOCH, &kp);

        pool.add(first.clone()).unwrap();
        assert_eq!(pool.add(first.clone()), Err(KeysPoolError::DuplicateKey));
        assert!(matches!(
            pool.add(second.clone()),
            Err(KeysPoolError::DuplicateSender(_))
        ));

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.stats().known_hashes, 0);
        assert_eq!(pool.head(), Some(test_head()));

        assert_eq!(pool.add(first), Ok(()));
        pool.clear();
        assert_eq!(pool.add(second), Ok(()));
    }

    #[test]
    fn rollover_drains_and_rebinds() {
        let (pool, _rx) = make_pool();
        let alice = SigningKeypair::generate();
        let bob = SigningKeypair::generate();
        let alice_key = FlipKey::new_signed(vec![1; 8], EPOCH, &alice);
        pool.add(alice_key.clone()).unwrap();
        pool.add(FlipKey::new_signed(vec![2; 8], EPOCH, &bob)).unwrap();

        let next = EpochHead {
            height: 2_000,
            hash: [9u8; 32],
            epoch: EPOCH + 1,
        };
        let drained = pool.rollover(next);
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
        assert_eq!(pool.head(), Some(next));

        // Same content is no longer a duplicate in the new epoch.
        assert_eq!(pool.add(alice_key), Ok(()));
    }

    #[test]
    fn stats_reporting() {
        let (sink, _rx) = ChannelEventSink::new(4);
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        let stats = pool.stats();
        assert_eq!(stats.key_count, 0);
        assert_eq!(stats.head_height, None);

        pool.initialize(test_head());
        let kp = SigningKeypair::generate();
        pool.add(FlipKey::new_signed(vec![1; 8], EPOCH, &kp)).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.known_hashes, 1);
        assert_eq!(stats.head_height, Some(1_000));
        assert_eq!(stats.epoch, Some(EPOCH));
    }

    #[test]
    fn admission_stands_when_sink_cannot_deliver() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        pool.initialize(test_head());

        let kp = SigningKeypair::generate();
        assert_eq!(pool.add(FlipKey::new_signed(vec![1; 8], EPOCH, &kp)), Ok(()));
        assert_eq!(pool.len(), 1);

        // Full channel: the second admission's event is dropped.
        let (sink, _rx) = ChannelEventSink::new(1);
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        pool.initialize(test_head());
        for byte in 0..3u8 {
            let kp = SigningKeypair::generate();
            assert_eq!(pool.add(FlipKey::new_signed(vec![byte; 8], EPOCH, &kp)), Ok(()));
        }
        assert_eq!(pool.len(), 3);
    }

    /// Signals when `publish` is entered, then waits for a release.
    struct GatedSink {
        entered: Mutex<std_mpsc::Sender<()>>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl EventSink for GatedSink {
        fn publish(&self, _event: NodeEvent) {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
        }
    }

    #[test]
    fn event_is_published_before_rollover_can_drain() {
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let sink = GatedSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let pool = KeysPool::new(Arc::new(AcceptAll), Arc::new(sink));
        pool.initialize(test_head());
        let kp = SigningKeypair::generate();
        let key = FlipKey::new_signed(vec![1; 8], EPOCH, &kp);

        std::thread::scope(|s| {
            let adder = s.spawn(|| pool.add(key));
            entered_rx.recv().unwrap();

            let next = EpochHead {
                epoch: EPOCH + 1,
                ..test_head()
            };
            let pool = &pool;
            let roller = s.spawn(move || pool.rollover(next));
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!roller.is_finished(), "rollover ran while an event was pending");

            release_tx.send(()).unwrap();
            assert_eq!(adder.join().unwrap(), Ok(()));
            assert_eq!(roller.join().unwrap().len(), 1);
        });
        assert!(pool.is_empty());
    }
}
