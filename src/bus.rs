//! Broadcast channel carrying [`WearableEvent`]s to any number of consumers.
//!
//! Producers (the connection actor and its session) publish without blocking;
//! each subscriber gets its own receiver and sees events from a given
//! producer in publish order.  A subscriber that falls more than
//! [`EVENT_CAPACITY`] events behind loses the oldest ones (`RecvError::Lagged`)
//! rather than back-pressuring the radio actor.

use tokio::sync::broadcast;

use crate::types::WearableEvent;

/// Ring-buffer capacity per subscriber.  Telemetry arrives at a few frames
/// per second at most, so this is hours of headroom for an interactive
/// consumer.
pub const EVENT_CAPACITY: usize = 256;

/// Shared publish/subscribe channel for [`WearableEvent`]s.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WearableEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Open a new subscription.  Only events published after this call are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<WearableEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// Never blocks; an event published while no subscriber exists is simply
    /// discarded.
    pub fn publish(&self, event: WearableEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
