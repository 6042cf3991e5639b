//! # Pipeline specification and runtime binding.
//!
//! [`PipelineSpec`] describes one subject/group/service binding. The server turns
//! each spec into a [`Pipeline`] owning its private [`Consumer`].
//!
//! ```text
//! PipelineSpec { subject, group, service, capacity? }
//!      └─► Pipeline { spec, consumer }      (one per registration)
//!             start: consumer.subscribe ─► spawn service ─► spawn relay
//!             stop:  consumer.close()
//! ```

use std::fmt;
use std::sync::Arc;

use crate::core::consumer::Consumer;
use crate::events::Bus;
use crate::services::ServiceRef;
use crate::transport::TransportRef;

/// Specification of one pipeline.
///
/// ## Example
/// ```rust
/// use natsrpc::{Message, PipelineSpec, ServiceFn, ServiceError};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn idle(
///     ctx: CancellationToken,
///     _rx: mpsc::Receiver<Message>,
///     _tx: mpsc::Sender<Message>,
/// ) -> Result<(), ServiceError> {
///     ctx.cancelled().await;
///     Ok(())
/// }
///
/// let spec = PipelineSpec::new("rpc.idle", "workers", ServiceFn::arc(idle)).with_capacity(16);
/// assert_eq!(spec.subject(), "rpc.idle");
/// assert_eq!(spec.group(), "workers");
/// assert_eq!(spec.capacity(), Some(16));
/// ```
#[derive(Clone)]
pub struct PipelineSpec {
    subject: Arc<str>,
    group: Arc<str>,
    service: ServiceRef,
    capacity: Option<usize>,
}

impl PipelineSpec {
    /// Binds `service` to `subject`. An empty `group` means fan-out.
    pub fn new(subject: impl Into<Arc<str>>, group: impl Into<Arc<str>>, service: ServiceRef) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
            service,
            capacity: None,
        }
    }

    /// Overrides the server-wide channel capacity for this pipeline (min 1).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// Subject the pipeline subscribes to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Queue group; empty for fan-out.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Channel capacity override, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Processing unit of the pipeline.
    pub fn service(&self) -> &ServiceRef {
        &self.service
    }
}

impl fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSpec")
            .field("subject", &self.subject)
            .field("group", &self.group)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// A registered pipeline: spec plus its private subscription manager.
pub(crate) struct Pipeline {
    pub(crate) spec: PipelineSpec,
    pub(crate) consumer: Consumer,
}

impl Pipeline {
    pub(crate) fn new(spec: PipelineSpec, transport: TransportRef, bus: Bus) -> Self {
        Self {
            spec,
            consumer: Consumer::new(transport).with_bus(bus),
        }
    }

    /// Request/response channel capacity for this pipeline.
    pub(crate) fn capacity(&self, default: usize) -> usize {
        self.spec.capacity.unwrap_or(default).max(1)
    }

    /// Short label used in diagnostics, e.g. `rpc.echo[workers]`.
    pub(crate) fn label(&self) -> String {
        if self.spec.group.is_empty() {
            self.spec.subject.to_string()
        } else {
            format!("{}[{}]", self.spec.subject, self.spec.group)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::ServiceFn;
    use crate::transport::{MemoryTransport, Message};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    async fn noop(
        _ctx: CancellationToken,
        _rx: mpsc::Receiver<Message>,
        _tx: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    #[test]
    fn test_capacity_override_and_default() {
        let nc = Arc::new(MemoryTransport::new());
        let plain = Pipeline::new(PipelineSpec::new("a", "", ServiceFn::arc(noop)), nc.clone(), Bus::new(1));
        assert_eq!(plain.capacity(64), 64);
        assert_eq!(plain.capacity(0), 1);

        let custom = Pipeline::new(
            PipelineSpec::new("a", "g", ServiceFn::arc(noop)).with_capacity(0),
            nc,
            Bus::new(1),
        );
        assert_eq!(custom.capacity(64), 1);
        assert_eq!(custom.label(), "a[g]");
        assert_eq!(plain.label(), "a");
    }
}
