//! # Publish/subscribe transport boundary.
//!
//! The server does not speak any wire protocol itself. It consumes a [`Transport`]:
//! subscribe with channel delivery (optionally within a queue group), drain,
//! unsubscribe and fire-and-forget publish of an addressed [`Message`].
//!
//! ```text
//!   publish(Message{subject, reply, payload})
//!        │
//!        ▼
//!   Transport ── subject match ──┬──► every plain subscriber        (fan-out)
//!                                └──► one member per queue group    (load sharing)
//!                                          │
//!                                          ▼
//!                                  mpsc::Sender<Message> handed in by the subscriber
//! ```
//!
//! [`MemoryTransport`] is the in-process reference implementation; broker-backed
//! transports are expected to approximate its semantics.

mod memory;
mod message;
mod request;
pub(crate) mod subject;

pub use memory::MemoryTransport;
pub use message::{Message, SubscriptionId};
pub use request::request;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Shared handle to a transport connection.
///
/// The connection is owned by the embedding application and outlives the server.
pub type TransportRef = Arc<dyn Transport>;

/// Capabilities the server needs from a pub/sub connection.
///
/// Implementations must be safe to share between all pipelines of a server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers every message published on `subject` to `tx`.
    async fn subscribe(
        &self,
        subject: &str,
        tx: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Delivers each message published on `subject` to exactly one member of `group`.
    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        tx: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Graceful unsubscribe: deliveries already handed to the channel stay there.
    async fn drain(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Immediate unsubscribe.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Publishes one message. No retry on failure.
    async fn publish(&self, msg: Message) -> Result<(), TransportError>;

    /// Returns a fresh, unique reply subject.
    fn new_inbox(&self) -> String {
        format!("_INBOX.{:016x}", rand::random::<u64>())
    }
}
