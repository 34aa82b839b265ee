//! In-process fan-out of trade events over a `tokio::sync::broadcast` channel.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{EventPublishError, EventPublisherPort, TradeEvent};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Publishes events to every current subscriber. Slow subscribers lag and
/// lose the oldest events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<TradeEvent>,
}

impl BroadcastEventPublisher {
    /// Create a publisher with room for `capacity` buffered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.sender.subscribe()
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventPublisherPort for BroadcastEventPublisher {
    async fn publish(&self, event: TradeEvent) -> Result<(), EventPublishError> {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}
