//! # Subscription manager of one pipeline.
//!
//! [`Consumer`] owns at most one transport subscription at a time.
//!
//! ```text
//!            subscribe(subject, group, tx)
//!   idle ───────────────────────────────────► subscribed
//!    ▲                                             │
//!    └──────────── close() = drain ────────────────┘
//!
//!   subscribe while subscribed → AlreadySubscribed (existing subscription kept)
//!   close while idle           → Ok(()) (no-op)
//!   drain failure              → Err, state stays subscribed (close may be retried)
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::ServerError;
use crate::events::{Bus, Event, EventKind};
use crate::transport::{Message, SubscriptionId, TransportRef};

/// Active subscription handle.
struct Active {
    id: SubscriptionId,
    subject: Arc<str>,
}

/// Holds zero or one active subscription on a shared transport.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use natsrpc::{Consumer, MemoryTransport, ServerError};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let nc = Arc::new(MemoryTransport::new());
/// let consumer = Consumer::new(nc.clone());
///
/// let (tx, _rx) = mpsc::channel(8);
/// consumer.subscribe("rpc.echo", "", tx.clone()).await.unwrap();
/// assert!(matches!(
///     consumer.subscribe("rpc.echo", "", tx).await,
///     Err(ServerError::AlreadySubscribed { .. })
/// ));
///
/// consumer.close().await.unwrap();
/// consumer.close().await.unwrap();
/// assert_eq!(nc.subscription_count("rpc.echo"), 0);
/// # }
/// ```
pub struct Consumer {
    transport: TransportRef,
    bus: Option<Bus>,
    state: Mutex<Option<Active>>,
}

impl Consumer {
    /// Creates an idle consumer on `transport`.
    pub fn new(transport: TransportRef) -> Self {
        Self {
            transport,
            bus: None,
            state: Mutex::new(None),
        }
    }

    /// Reports subscribe/drain outcomes on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Subscribes to `subject`, delivering onto `tx`.
    ///
    /// A non-empty `group` joins that queue group; an empty one is a plain (fan-out) subscription.
    ///
    /// # Errors
    /// - [`ServerError::AlreadySubscribed`] if a subscription is active;
    /// - [`ServerError::Transport`] if the transport rejects the subscription.
    pub async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        tx: mpsc::Sender<Message>,
    ) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        if let Some(active) = state.as_ref() {
            return Err(ServerError::AlreadySubscribed {
                subject: active.subject.to_string(),
            });
        }

        let subscribed = if group.is_empty() {
            self.transport.subscribe(subject, tx).await
        } else {
            self.transport.queue_subscribe(subject, group, tx).await
        };
        let id = subscribed.map_err(|source| ServerError::Transport {
            subject: subject.to_string(),
            source,
        })?;

        let subject: Arc<str> = Arc::from(subject);
        self.publish(
            Event::new(EventKind::PipelineSubscribed)
                .with_subject(Arc::clone(&subject))
                .with_group(group),
        );
        *state = Some(Active { id, subject });
        Ok(())
    }

    /// Drains the active subscription, if any. Idempotent.
    ///
    /// # Errors
    /// [`ServerError::Transport`] if the drain fails; the subscription is then kept
    /// and `close` may be called again.
    pub async fn close(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        let Some(active) = state.as_ref() else {
            return Ok(());
        };

        match self.transport.drain(active.id).await {
            Ok(()) => {
                self.publish(
                    Event::new(EventKind::SubscriptionDrained)
                        .with_subject(Arc::clone(&active.subject)),
                );
                *state = None;
                Ok(())
            }
            Err(source) => {
                self.publish(
                    Event::new(EventKind::DrainFailed)
                        .with_subject(Arc::clone(&active.subject))
                        .with_reason(source.to_string()),
                );
                Err(ServerError::Transport {
                    subject: active.subject.to_string(),
                    source,
                })
            }
        }
    }

    /// True while a subscription is active.
    pub async fn is_subscribed(&self) -> bool {
        self.state.lock().await.is_some()
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}
