//! Node event publishing.
//!
//! Components announce state changes through an [`EventSink`] supplied at
//! construction. Publishing is fire-and-forget: a sink that cannot deliver
//! drops the event, it never fails the operation that produced it.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::flip_key::FlipKey;

/// Events emitted by node components.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// A flip key was admitted to the keys pool.
    NewFlipKey(Arc<FlipKey>),
}

/// Destination for node events.
///
/// The keys pool publishes while holding its lock, so that an admission event
/// always precedes the epoch rollover that drains the key. Implementations
/// must not block and must not call back into the pool.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: NodeEvent);
}

/// Event sink backed by a bounded tokio channel.
///
/// Uses `try_send` so publishing never blocks the caller; a full or closed
/// channel drops the event with a warning.
#[derive(Clone, Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<NodeEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver that consumes its events.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NodeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelEventSink { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: NodeEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Event channel closed, dropping event");
            }
        }
    }
}
