//! Runtime core: pipelines and their supervision.
//!
//! The public API of this module is [`Server`] (with [`ServerBuilder`]),
//! [`PipelineSpec`] and [`Consumer`].
//!
//! Internal modules:
//! - [`server`]: registration, fail-fast supervision, grace handling and teardown;
//! - [`consumer`]: per-pipeline subscription manager (idle/subscribed);
//! - [`publisher`]: per-pipeline outbound relay;
//! - [`pipeline`]: pipeline specification and runtime binding;
//! - [`shutdown`]: OS termination signal handling.
//!
//! ```text
//!                       ┌──────────── Server (one CancellationToken child) ───────────┐
//!  transport ──deliver──► Consumer ─► [requests] ─► Service ─► [responses] ─► Publisher ──publish──► transport
//!                       │       ... one row per registered pipeline ...              │
//!                       └─────────────────────────────────────────────────────────────┘
//!  Server, Consumer ── publish(Event) ──► Bus ──► SubscriberSet ──► Subscribe impls
//! ```

mod builder;
mod consumer;
mod pipeline;
mod publisher;
mod server;
mod shutdown;

pub use builder::ServerBuilder;
pub use consumer::Consumer;
pub use pipeline::PipelineSpec;
pub use server::Server;
