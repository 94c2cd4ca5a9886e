//! Event Bus Service
//!
//! Pub/sub system for broadcasting domain events to subscribers.
//! Implements the Observer pattern for loose coupling.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

/// Channel capacity for event broadcasting.
const CHANNEL_CAPACITY: usize = 1024;

/// Event bus for publishing and subscribing to domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        let event_type = event.event_type();
        match self.sender.send(Arc::new(event)) {
            Ok(count) => debug!("Published {} event to {} subscribers", event_type, count),
            Err(_) => debug!("Published {} event (no active subscribers)", event_type),
        }
    }

    /// Subscribes to events.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A subscriber to domain events.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<Arc<DomainEvent>>,
}

impl EventSubscriber {
    /// Receives the next event, waiting if necessary.
    ///
    /// Returns `None` when the bus is closed. A lagged subscriber skips the
    /// dropped events and continues with the next available one.
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Event subscriber lagged by {} events", count);
                }
            }
        }
    }

    /// Tries to receive an event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.receiver.try_recv().ok()
    }
}
