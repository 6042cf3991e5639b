//! # Function-backed service (`ServiceFn`)
//!
//! [`ServiceFn`] wraps a closure `F: Fn(CancellationToken, Receiver, Sender) -> Fut`,
//! producing a fresh future per pipeline start. Shared state, if any, is captured
//! explicitly as `Arc<...>` inside the closure.
//!
//! ## Example
//! ```rust
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use natsrpc::{Message, ServiceError, ServiceFn, ServiceRef, next_request, reply};
//!
//! async fn echo(
//!     ctx: CancellationToken,
//!     mut rx: mpsc::Receiver<Message>,
//!     tx: mpsc::Sender<Message>,
//! ) -> Result<(), ServiceError> {
//!     loop {
//!         let req = next_request(&ctx, &mut rx).await?;
//!         if let Some(resp) = req.respond(req.payload.clone()) {
//!             reply(&ctx, &tx, resp).await?;
//!         }
//!     }
//! }
//!
//! let svc: ServiceRef = ServiceFn::arc(echo);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::services::service::Service;
use crate::transport::Message;

/// Function-backed service implementation.
#[derive(Debug)]
pub struct ServiceFn<F> {
    f: F,
}

impl<F> ServiceFn<F> {
    /// Creates a new function-backed service.
    ///
    /// Prefer [`ServiceFn::arc`] when you immediately need a [`ServiceRef`](crate::ServiceRef).
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the service and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Service for ServiceFn<F>
where
    F: Fn(CancellationToken, mpsc::Receiver<Message>, mpsc::Sender<Message>) -> Fut
        + Send
        + Sync
        + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    async fn serve(
        &self,
        ctx: CancellationToken,
        requests: mpsc::Receiver<Message>,
        responses: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        (self.f)(ctx, requests, responses).await
    }
}
