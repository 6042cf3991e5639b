//! # Event subscribers for the server runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! that delivers runtime [`Event`](crate::Event)s to user code.
//!
//! ```text
//! Server / Consumer / DispatchService
//!        │ publish(Event)
//!        ▼
//!       Bus ──► Server::subscriber_listener ──► SubscriberSet::emit
//!                                                 ├──► [queue] ─► worker ─► LogWriter
//!                                                 ├──► [queue] ─► worker ─► Metrics
//!                                                 └──► [queue] ─► worker ─► Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use natsrpc::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if matches!(event.kind, EventKind::ServiceFailed | EventKind::RelayFailed) {
//!             // increment failure counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub(crate) use set::panic_message;
pub use subscribe::Subscribe;
