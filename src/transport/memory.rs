//! # In-process reference transport.
//!
//! [`MemoryTransport`] routes messages between subscribers living in the same process.
//! It defines the reference behavior for subject matching and delivery:
//!
//! - **Fan-out**: every plain subscriber whose pattern matches receives a copy.
//! - **Queue groups**: per matching group, exactly one member with an open channel
//!   receives the message (picked at random).
//! - **Backpressure**: none. Delivery never waits: a subscriber whose channel is
//!   full misses the message (slow consumer), the same as a closed one.
//! - **Drain/unsubscribe**: both stop routing immediately; messages already sitting
//!   in the subscriber's channel stay there.
//!
//! ```text
//! publish(msg)
//!   ├─ lock ─► collect matching senders ─► unlock
//!   └─ for each target: tx.try_send(msg.clone())   (full or closed receivers miss it)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use super::{Message, SubscriptionId, Transport, subject};
use crate::error::TransportError;

/// One registered subscription.
struct Entry {
    pattern: String,
    group: Option<String>,
    tx: mpsc::Sender<Message>,
}

/// In-memory pub/sub broker.
///
/// ## Example
/// ```rust
/// use natsrpc::{Message, MemoryTransport, Transport};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let nc = MemoryTransport::new();
/// let (tx, mut rx) = mpsc::channel(8);
/// nc.subscribe("greet.*", tx).await.unwrap();
/// nc.publish(Message::new("greet.joe", "hi")).await.unwrap();
/// assert_eq!(rx.recv().await.unwrap().subject, "greet.joe");
/// # }
/// ```
#[derive(Default)]
pub struct MemoryTransport {
    subs: Mutex<BTreeMap<SubscriptionId, Entry>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions registered with exactly this subject pattern.
    pub fn subscription_count(&self, pattern: &str) -> usize {
        self.subs
            .lock()
            .values()
            .filter(|e| e.pattern == pattern)
            .count()
    }

    /// Total number of live subscriptions.
    pub fn total_subscriptions(&self) -> usize {
        self.subs.lock().len()
    }

    /// Closes the connection: drops all subscriptions and rejects further calls.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subs.lock().clear();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn insert(
        &self,
        pattern: &str,
        group: Option<&str>,
        tx: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError> {
        self.ensure_open()?;
        if !subject::is_valid(pattern, true) {
            return Err(TransportError::InvalidSubject(pattern.to_string()));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.subs.lock().insert(
            id,
            Entry {
                pattern: pattern.to_string(),
                group: group.map(str::to_string),
                tx,
            },
        );
        Ok(id)
    }

    fn remove(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.ensure_open()?;
        match self.subs.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::UnknownSubscription(id)),
        }
    }

    /// Resolves the set of channels a message on `subject` is delivered to.
    fn targets(&self, subject: &str) -> Vec<mpsc::Sender<Message>> {
        let subs = self.subs.lock();
        let mut out = Vec::new();
        let mut groups: HashMap<&str, Vec<&mpsc::Sender<Message>>> = HashMap::new();

        for entry in subs.values() {
            if entry.tx.is_closed() || !subject::matches(&entry.pattern, subject) {
                continue;
            }
            match entry.group.as_deref() {
                None => out.push(entry.tx.clone()),
                Some(group) => groups.entry(group).or_default().push(&entry.tx),
            }
        }

        let mut rng = rand::rng();
        for members in groups.into_values() {
            let pick = rng.random_range(0..members.len());
            out.push(members[pick].clone());
        }
        out
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        subject: &str,
        tx: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError> {
        self.insert(subject, None, tx)
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        tx: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError> {
        if group.is_empty() {
            return self.insert(subject, None, tx);
        }
        self.insert(subject, Some(group), tx)
    }

    async fn drain(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.remove(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.remove(id)
    }

    async fn publish(&self, msg: Message) -> Result<(), TransportError> {
        self.ensure_open()?;
        if !subject::is_valid(&msg.subject, false) {
            return Err(TransportError::InvalidSubject(msg.subject));
        }
        for tx in self.targets(&msg.subject) {
            let _ = tx.try_send(msg.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        mpsc::channel(64)
    }

    #[tokio::test]
    async fn test_fan_out_to_plain_subscribers() {
        let nc = MemoryTransport::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        nc.subscribe("rpc.echo", tx1).await.unwrap();
        nc.subscribe("rpc.echo", tx2).await.unwrap();

        nc.publish(Message::new("rpc.echo", "a")).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().payload, "a");
        assert_eq!(rx2.recv().await.unwrap().payload, "a");
    }

    #[tokio::test]
    async fn test_queue_group_delivers_once() {
        let nc = MemoryTransport::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        nc.queue_subscribe("rpc.echo", "workers", tx1).await.unwrap();
        nc.queue_subscribe("rpc.echo", "workers", tx2).await.unwrap();

        for i in 0..20 {
            nc.publish(Message::new("rpc.echo", format!("{i}")))
                .await
                .unwrap();
        }

        let mut total = 0;
        while rx1.try_recv().is_ok() {
            total += 1;
        }
        while rx2.try_recv().is_ok() {
            total += 1;
        }
        assert_eq!(total, 20);
    }

    #[tokio::test]
    async fn test_empty_group_is_plain_subscription() {
        let nc = MemoryTransport::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        nc.queue_subscribe("rpc.echo", "", tx1).await.unwrap();
        nc.queue_subscribe("rpc.echo", "", tx2).await.unwrap();

        nc.publish(Message::new("rpc.echo", "x")).await.unwrap();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_drain_stops_routing() {
        let nc = MemoryTransport::new();
        let (tx, mut rx) = channel();
        let sid = nc.subscribe("rpc.echo", tx).await.unwrap();
        nc.publish(Message::new("rpc.echo", "before")).await.unwrap();
        nc.drain(sid).await.unwrap();
        nc.publish(Message::new("rpc.echo", "after")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, "before");
        assert!(rx.try_recv().is_err());
        assert_eq!(nc.subscription_count("rpc.echo"), 0);
    }

    #[tokio::test]
    async fn test_full_subscriber_misses_message() {
        let nc = MemoryTransport::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (tx, mut rx) = channel();
        nc.subscribe("client.inbox", slow_tx).await.unwrap();
        nc.subscribe("client.inbox", tx).await.unwrap();

        for i in 0..3 {
            nc.publish(Message::new("client.inbox", format!("{i}")))
                .await
                .unwrap();
        }

        assert_eq!(slow_rx.recv().await.unwrap().payload, "0");
        assert!(slow_rx.try_recv().is_err());
        for i in 0..3 {
            assert_eq!(rx.recv().await.unwrap().payload, format!("{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_unknown_subscription() {
        let nc = MemoryTransport::new();
        let err = nc.unsubscribe(SubscriptionId(42)).await.unwrap_err();
        assert_eq!(err, TransportError::UnknownSubscription(SubscriptionId(42)));
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_calls() {
        let nc = MemoryTransport::new();
        let (tx, _rx) = channel();
        nc.close();
        assert_eq!(
            nc.subscribe("rpc.echo", tx).await.unwrap_err(),
            TransportError::Closed
        );
        assert_eq!(
            nc.publish(Message::new("rpc.echo", "x")).await.unwrap_err(),
            TransportError::Closed
        );
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_subject() {
        let nc = MemoryTransport::new();
        let err = nc.publish(Message::new("rpc.*", "x")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidSubject(_)));
    }
}
