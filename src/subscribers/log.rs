//! # LogWriter — simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [subscribed] subject="rpc.echo" group="workers"
//! [starting] subject="rpc.echo"
//! [service-failed] subject="rpc.echo" err="boom"
//! [shutdown-requested] reason="service on subject 'rpc.echo' failed: ..."
//! [drained] subject="rpc.echo"
//! [all-stopped-within-grace]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let subject = e.subject.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::PipelineSubscribed => {
                println!(
                    "[subscribed] subject={subject:?} group={:?}",
                    e.group.as_deref().unwrap_or("")
                );
            }
            EventKind::PipelineStarting => println!("[starting] subject={subject:?}"),
            EventKind::TaskStopped => {
                println!("[stopped] subject={subject:?} role={}", e.role.unwrap_or("-"));
            }
            EventKind::ServiceFailed => {
                println!("[service-failed] subject={subject:?} err={reason:?}");
            }
            EventKind::RelayFailed => {
                println!("[relay-failed] subject={subject:?} err={reason:?}");
            }
            EventKind::TaskPanicked => {
                println!(
                    "[panicked] subject={subject:?} role={} info={reason:?}",
                    e.role.unwrap_or("-")
                );
            }
            EventKind::RequestDropped => {
                println!("[request-dropped] subject={subject:?} reason={reason:?}");
            }
            EventKind::ShutdownRequested => println!("[shutdown-requested] reason={reason:?}"),
            EventKind::SubscriptionDrained => println!("[drained] subject={subject:?}"),
            EventKind::DrainFailed => {
                println!("[drain-failed] subject={subject:?} err={reason:?}");
            }
            EventKind::AllStoppedWithin => println!("[all-stopped-within-grace]"),
            EventKind::GraceExceeded => {
                println!("[grace-exceeded] grace_ms={:?}", e.grace_ms);
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber] name={} info={reason}",
                    e.subscriber.unwrap_or("unknown")
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
