//! # Runtime events emitted by the server and its pipelines.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Pipeline events**: subscription, task start, task exit/failure, request drops
//! - **Shutdown events**: cancellation, drains, grace handling
//! - **Subscriber events**: per-subscriber overflow and panics
//!
//! The [`Event`] struct carries additional metadata such as timestamps, subject,
//! queue group, the pipeline role that produced it and a reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use natsrpc::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceFailed)
//!     .with_subject("rpc.echo")
//!     .with_group("workers")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::ServiceFailed);
//! assert_eq!(ev.subject.as_deref(), Some("rpc.echo"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Pipeline events ===
    /// A pipeline's consumer subscribed to its subject.
    ///
    /// Sets:
    /// - `subject`, `group`
    PipelineSubscribed,

    /// Service and relay tasks of a pipeline were spawned.
    ///
    /// Sets:
    /// - `subject`, `group`
    PipelineStarting,

    /// A pipeline task returned without failure.
    ///
    /// Sets:
    /// - `subject`, `role`
    TaskStopped,

    /// A service returned a failure.
    ///
    /// Sets:
    /// - `subject`, `role = "service"`, `reason`
    ServiceFailed,

    /// A relay failed to publish.
    ///
    /// Sets:
    /// - `subject`, `role = "relay"`, `reason`
    RelayFailed,

    /// A pipeline task panicked.
    ///
    /// Sets:
    /// - `subject`, `role`, `reason`
    TaskPanicked,

    /// A request could not be answered (no reply subject, bad envelope).
    ///
    /// Sets:
    /// - `subject`, `reason`
    RequestDropped,

    // === Shutdown events ===
    /// Cancellation was triggered (caller, signal or first failure).
    ///
    /// Sets:
    /// - `reason` when triggered by a failure
    ShutdownRequested,

    /// A pipeline's subscription was drained.
    ///
    /// Sets:
    /// - `subject`
    SubscriptionDrained,

    /// Draining a pipeline's subscription failed.
    ///
    /// Sets:
    /// - `subject`, `reason`
    DrainFailed,

    /// All pipeline tasks exited within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining tasks were aborted.
    ///
    /// Sets:
    /// - `grace_ms`
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber queue was full; the event was dropped for it.
    ///
    /// Sets:
    /// - `subscriber`, `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`, `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Pipeline subject, if applicable.
    pub subject: Option<Arc<str>>,
    /// Pipeline queue group, if any.
    pub group: Option<Arc<str>>,
    /// Pipeline task that produced the event (`service` or `relay`).
    pub role: Option<&'static str>,
    /// Subscriber name for subscriber events.
    pub subscriber: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Shutdown grace in milliseconds (compact).
    pub grace_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subject: None,
            group: None,
            role: None,
            subscriber: None,
            reason: None,
            grace_ms: None,
        }
    }

    /// Attaches a pipeline subject.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a queue group; empty groups are ignored.
    #[inline]
    pub fn with_group(mut self, group: &str) -> Self {
        if !group.is_empty() {
            self.group = Some(group.into());
        }
        self
    }

    /// Attaches the pipeline role.
    #[inline]
    pub fn with_role(mut self, role: &'static str) -> Self {
        self.role = Some(role);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a grace duration (stored as milliseconds).
    #[inline]
    pub fn with_grace(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.grace_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// True for events produced by the subscriber machinery itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::PipelineSubscribed);
        let b = Event::new(EventKind::PipelineSubscribed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_empty_group_not_recorded() {
        let ev = Event::new(EventKind::PipelineSubscribed).with_group("");
        assert!(ev.group.is_none());
    }

    #[test]
    fn test_subscriber_constructors() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert_eq!(ev.subscriber, Some("audit"));
        assert!(ev.is_subscriber_event());
        assert!(!Event::new(EventKind::GraceExceeded).is_subscriber_event());
    }
}
