//! # Global server configuration.
//!
//! Provides [`ServerConfig`] centralized settings for the pipeline supervisor.
//!
//! Config is used in two ways:
//! 1. **Server creation**: `Server::builder(transport).with_config(cfg)`
//! 2. **Pipeline defaults**: pipelines without their own capacity use `channel_capacity`
//!
//! ## Sentinel values
//! - `grace = 0s` → do not wait for tasks after cancellation, abort them immediately

use std::time::Duration;

/// Global configuration for the server runtime.
///
/// ## Field semantics
/// - `channel_capacity`: request/response channel size per pipeline (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `grace`: maximum wait for pipeline tasks to exit after cancellation
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Capacity of each pipeline's request and response channel.
    ///
    /// Bounded channels give backpressure: a slow relay stalls its service,
    /// a slow service stalls delivery from the transport.
    /// Individual pipelines may override it via
    /// [`PipelineSpec::with_capacity`](crate::PipelineSpec::with_capacity).
    pub channel_capacity: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Maximum time to wait for pipeline tasks once cancellation is triggered.
    ///
    /// Tasks still running afterwards are aborted and reported via
    /// `EventKind::GraceExceeded`.
    pub grace: Duration,
}

impl ServerConfig {
    /// Returns the channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn channel_capacity_clamped(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ServerConfig {
    /// Default configuration:
    ///
    /// - `channel_capacity = 1024`
    /// - `bus_capacity = 1024`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            bus_capacity: 1024,
            grace: Duration::from_secs(30),
        }
    }
}
