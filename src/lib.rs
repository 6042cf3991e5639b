//! # natsrpc
//!
//! **natsrpc** is an RPC layer over a publish/subscribe transport.
//!
//! It has two halves that can be used independently:
//! - a typed **dispatch registry** ([`Mapper`]) routing `receiver.method` names to
//!   registered methods of shape `(P) -> Result<R, E>`;
//! - a **pipeline server** ([`Server`]) binding subjects to processing units
//!   ([`Service`]) and supervising them as one all-or-nothing unit of liveness.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ PipelineSpec │   │ PipelineSpec │   │ PipelineSpec │
//!     │ subject/group│   │ subject/group│   │ subject/group│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Server (pipeline supervisor)                                     │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! │  - child CancellationToken shared by every pipeline task          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   Consumer ─► [req] ─► Service ─► [resp] ─► Publisher      (one row per pipeline)
//!        ▲                                        │
//!        └───────────── Transport (shared) ◄──────┘
//! ```
//!
//! ### Supervision
//! ```text
//! start(ctx)
//!   ├─► no pipelines ─► Err(NoPipelines)
//!   ├─► subscribe + spawn service/relay per pipeline (registration order)
//!   ├─► wait: first failure ─► cancel all ─► return that failure
//!   │         caller cancel  ─► every task exits ─► Ok(())
//!   └─► always: close every subscription (drain), registration order
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Registry**      | Typed method table with zero-valued param/result holders.      | [`Mapper`], [`Receiver`], [`Value`]         |
//! | **Pipelines**     | Subject/group/service bindings with fail-fast supervision.     | [`Server`], [`PipelineSpec`], [`Consumer`]  |
//! | **Services**      | Processing units as trait impls, closures or mapper dispatch.  | [`Service`], [`ServiceFn`], [`DispatchService`] |
//! | **Transport**     | Pub/sub boundary plus an in-process reference broker.          | [`Transport`], [`MemoryTransport`]          |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom).           | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels.                               | [`ServerError`], [`CallError`]              |
//! | **Configuration** | Channel sizes, bus size, shutdown grace.                       | [`ServerConfig`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use natsrpc::{DispatchReply, DispatchRequest, DispatchService, Mapper, MemoryTransport, Server};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mapper = Arc::new(Mapper::new());
//!     mapper.add("Echo", "Echos", |s: String| Ok::<_, Infallible>(s));
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn natsrpc::Subscribe>> = vec![Arc::new(natsrpc::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn natsrpc::Subscribe>> = Vec::new();
//!
//!     let nc = Arc::new(MemoryTransport::new());
//!     let mut server = Server::builder(nc.clone()).with_subscribers(subs).build();
//!     let dispatch = DispatchService::new(mapper).with_bus(server.bus().clone());
//!     server.register("rpc.echo", "workers", Arc::new(dispatch))?;
//!
//!     let ctx = CancellationToken::new();
//!     let stop = ctx.clone();
//!     let running = tokio::spawn(async move { server.start(stop).await });
//!     while nc.subscription_count("rpc.echo") == 0 {
//!         tokio::task::yield_now().await;
//!     }
//!
//!     let body = DispatchRequest::new("Echo", "Echos", &"hello world!")?.to_vec()?;
//!     let msg = natsrpc::request(nc.as_ref(), "rpc.echo", body, Duration::from_secs(1)).await?;
//!     let reply = DispatchReply::from_slice(&msg.payload)?;
//!     assert_eq!(reply.result_as::<String>()?.as_deref(), Some("hello world!"));
//!
//!     ctx.cancel();
//!     running.await??;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod mapper;
mod services;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use config::ServerConfig;
pub use core::{Consumer, PipelineSpec, Server, ServerBuilder};
pub use error::{BoxError, CallError, ServerError, ServiceError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use mapper::{Mapper, MethodInfo, Methods, Receiver, Value};
pub use services::{
    DispatchFault, DispatchReply, DispatchRequest, DispatchService, Service, ServiceFn, ServiceRef,
    next_request, reply,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{
    MemoryTransport, Message, SubscriptionId, Transport, TransportRef, request,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
