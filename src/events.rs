//! Broadcast event bus for store notifications.
//!
//! When a previously incomplete object finishes background materialization,
//! the store publishes [`StoreEvent::MaterializationCompleted`] so observers
//! (typically a list view above the access layer) can re-request values and
//! refresh. Each store instance owns its bus; there is no process-global
//! bus, so multiple stores coexist in tests without crosstalk.

use crate::models::LocalId;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Events published by an [`crate::IncrementalStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A previously incomplete object finished loading its full attribute
    /// set; `values_for` now returns complete values.
    MaterializationCompleted {
        /// Identifier of the materialized object.
        id: LocalId,
    },
    /// A batch save was confirmed by the remote tier.
    SaveCompleted {
        /// Identifiers assigned to the batch's inserts.
        inserted: Vec<LocalId>,
    },
}

/// Broadcast bus carrying [`StoreEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort; an event with no
    /// subscribers is dropped).
    pub fn publish(&self, event: StoreEvent) {
        metrics::counter!("store_events_published_total").increment(1);
        if self.sender.send(event).is_err() {
            metrics::counter!("store_events_dropped_total").increment(1);
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        let id = LocalId::new("Band", "xK91aa");
        bus.publish(StoreEvent::MaterializationCompleted { id: id.clone() });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, StoreEvent::MaterializationCompleted { id });
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        // Must not panic or block.
        bus.publish(StoreEvent::SaveCompleted { inserted: vec![] });
    }
}
