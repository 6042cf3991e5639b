//! # Processing units.
//!
//! This module provides the service-related types:
//! - [`Service`] - trait for the pluggable unit that turns requests into responses
//! - [`ServiceFn`] - closure-backed service
//! - [`ServiceRef`] - shared reference to a service (`Arc<dyn Service>`)
//! - [`DispatchService`] - ready-made service routing JSON requests through a [`Mapper`](crate::Mapper)
//! - [`next_request`] / [`reply`] - cancellation-aware channel helpers

mod dispatch;
mod service;
mod service_fn;

pub use dispatch::{DispatchFault, DispatchReply, DispatchRequest, DispatchService};
pub use service::{Service, ServiceRef, next_request, reply};
pub use service_fn::ServiceFn;
