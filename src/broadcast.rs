//! Event Broadcaster
//!
//! Fan-out of engine events to any number of subscribers. Sending never
//! blocks and never fails the engine: with no subscribers the event is simply
//! dropped, and slow subscribers lag rather than apply backpressure.

use tokio::sync::broadcast;
use tracing::trace;

use crate::game::events::GameEvent;

/// Buffered events per subscriber before lagging kicks in.
const CHANNEL_CAPACITY: usize = 256;

/// Handle for emitting and subscribing to engine events.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<GameEvent>,
}

impl Broadcaster {
    /// New broadcaster with the default buffer.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emit an event to all current subscribers. Fire-and-forget.
    pub fn emit(&self, event: GameEvent) {
        // Err means no live subscribers, which is fine.
        if self.tx.send(event).is_err() {
            trace!("event dropped: no subscribers");
        }
    }

    /// Subscribe to the event stream from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
