//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that pipeline consumers, the
//! supervisor and the dispatch service can report what happens without ever
//! blocking on observers.
//!
//! ```text
//! Publishers (many):                  Listener (one):
//!   Server    ──┐
//!   Consumer  ──┼──────► Bus ───────► Server::subscriber_listener ──► SubscriberSet
//!   Dispatch  ──┘  (broadcast chan)
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; events are dropped when nobody listens.
//! - One ring buffer of `capacity` events is shared by all receivers; a slow
//!   receiver gets `RecvError::Lagged(n)` and skips the `n` oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers (fire-and-forget).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn test_receiver_sees_later_events() {
        let bus = Bus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ShutdownRequested);
    }
}
