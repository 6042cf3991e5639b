//! # Server: pipeline registration and fail-fast supervision.
//!
//! The [`Server`] owns its pipelines, the event bus and a [`SubscriberSet`]. It
//! subscribes every pipeline, runs the services and relays as one task group and
//! tears all subscriptions down when the group ends.
//!
//! ## Lifecycle
//! ```text
//!  Idle ──register()/add()──► Idle ──start(ctx)──► Running ──► Stopped
//!                                                  (register/start now → NotIdle)
//! ```
//!
//! ## start(ctx)
//! ```text
//! 0 pipelines? ─► Err(NoPipelines), nothing subscribed
//!
//! token = ctx.child_token()
//! for pipeline in registration order:
//!     (req_tx, req_rx), (resp_tx, resp_rx) = mpsc::channel(capacity)
//!     consumer.subscribe(subject, group, req_tx)?   ── Err ─► cancel, wind down, teardown, Err
//!     set.spawn(service.serve(token, req_rx, resp_tx))
//!     set.spawn(relay.run(token, resp_rx))
//!
//! supervise:
//!     join_next ── Ok ─────────► keep waiting (all returned → Ok)
//!               ── failure ────► first error wins ─► token.cancel()
//!     token.cancelled() (caller) ─► stop waiting
//!
//! wind down: join the rest within cfg.grace, abort stragglers (GraceExceeded)
//! teardown:  consumer.close() for every pipeline, registration order, best effort
//! ```
//!
//! The caller's token is never cancelled by the server; only the child is.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::{
    builder::ServerBuilder,
    pipeline::{Pipeline, PipelineSpec},
    publisher::Publisher,
    shutdown,
};
use crate::error::{ServerError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::services::ServiceRef;
use crate::subscribers::{SubscriberSet, panic_message};
use crate::transport::TransportRef;

const ROLE_SERVICE: &str = "service";
const ROLE_RELAY: &str = "relay";

/// Identifies a spawned pipeline task.
struct TaskTag {
    subject: Arc<str>,
    role: &'static str,
}

type Tags = HashMap<Id, TaskTag>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

/// Supervisor of a set of RPC pipelines sharing one transport connection.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use natsrpc::{MemoryTransport, Message, Server, ServiceError, ServiceFn, next_request, reply, request};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn echo(
///     ctx: CancellationToken,
///     mut rx: mpsc::Receiver<Message>,
///     tx: mpsc::Sender<Message>,
/// ) -> Result<(), ServiceError> {
///     loop {
///         let req = next_request(&ctx, &mut rx).await?;
///         if let Some(resp) = req.respond(req.payload.clone()) {
///             reply(&ctx, &tx, resp).await?;
///         }
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let nc = Arc::new(MemoryTransport::new());
/// let mut server = Server::new(nc.clone());
/// server.register("rpc.echo", "", ServiceFn::arc(echo))?;
///
/// let ctx = CancellationToken::new();
/// let stop = ctx.clone();
/// let running = tokio::spawn(async move { server.start(stop).await });
///
/// while nc.subscription_count("rpc.echo") == 0 {
///     tokio::task::yield_now().await;
/// }
/// let resp = request(nc.as_ref(), "rpc.echo", "ping", Duration::from_secs(1)).await?;
/// assert_eq!(resp.payload, "ping");
///
/// ctx.cancel();
/// running.await??;
/// assert_eq!(nc.subscription_count("rpc.echo"), 0);
/// # Ok(())
/// # }
/// ```
pub struct Server {
    cfg: ServerConfig,
    transport: TransportRef,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    pipelines: Vec<Pipeline>,
    state: State,
    listener: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a server with default configuration and no subscribers.
    pub fn new(transport: TransportRef) -> Self {
        ServerBuilder::new(transport).build()
    }

    /// Returns a builder for configuring the server.
    pub fn builder(transport: TransportRef) -> ServerBuilder {
        ServerBuilder::new(transport)
    }

    pub(crate) fn new_internal(
        cfg: ServerConfig,
        transport: TransportRef,
        bus: Bus,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        Self {
            cfg,
            transport,
            bus,
            subs,
            pipelines: Vec::new(),
            state: State::Idle,
            listener: None,
        }
    }

    /// Registers a pipeline binding `service` to `subject`.
    ///
    /// A non-empty `group` load-shares messages among every registrant of that group;
    /// an empty one delivers every message to this service (fan-out).
    ///
    /// # Errors
    /// [`ServerError::NotIdle`] once the server has been started.
    pub fn register(
        &mut self,
        subject: impl Into<Arc<str>>,
        group: impl Into<Arc<str>>,
        service: ServiceRef,
    ) -> Result<(), ServerError> {
        self.add(PipelineSpec::new(subject, group, service))
    }

    /// Registers a pipeline from a full specification.
    ///
    /// # Errors
    /// [`ServerError::NotIdle`] once the server has been started.
    pub fn add(&mut self, spec: PipelineSpec) -> Result<(), ServerError> {
        if self.state != State::Idle {
            return Err(ServerError::NotIdle);
        }
        self.pipelines
            .push(Pipeline::new(spec, Arc::clone(&self.transport), self.bus.clone()));
        Ok(())
    }

    /// Number of registered pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// True if no pipeline is registered.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Labels of the registered pipelines, in registration order.
    pub fn pipelines(&self) -> Vec<String> {
        self.pipelines.iter().map(Pipeline::label).collect()
    }

    /// Event bus of this server; hand clones to services that report events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    /// Runs all pipelines until `ctx` is cancelled or a pipeline fails.
    ///
    /// Returns `Ok(())` only if every task stopped without failure. Otherwise the
    /// first failure is returned; a failure cancels every other pipeline. All
    /// subscriptions are closed before returning, on every path.
    ///
    /// # Errors
    /// - [`ServerError::NoPipelines`] / [`ServerError::NotIdle`] before anything starts;
    /// - [`ServerError::Transport`] / [`ServerError::AlreadySubscribed`] if a subscription fails;
    /// - [`ServerError::Service`], [`ServerError::Relay`], [`ServerError::Panicked`] from a task;
    /// - [`ServerError::GraceExceeded`] if tasks ignored cancellation for longer than `cfg.grace`.
    pub async fn start(&mut self, ctx: CancellationToken) -> Result<(), ServerError> {
        if self.state != State::Idle {
            return Err(ServerError::NotIdle);
        }
        if self.pipelines.is_empty() {
            return Err(ServerError::NoPipelines);
        }
        self.state = State::Running;
        self.subscriber_listener();

        let token = ctx.child_token();
        let mut set = JoinSet::new();
        let mut tags = Tags::new();

        let res = match self.launch(&mut set, &mut tags, &token).await {
            Ok(()) => self.supervise(&mut set, &mut tags, &token).await,
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::ShutdownRequested).with_reason(e.to_string()),
                );
                token.cancel();
                let mut first = Some(e);
                // The subscribe error wins over GraceExceeded.
                let _ = self.wind_down(&mut set, &mut tags, &mut first).await;
                first.map_or(Ok(()), Err)
            }
        };

        self.teardown().await;
        self.state = State::Stopped;
        res
    }

    /// Runs [`start`](Self::start) until an OS termination signal arrives.
    ///
    /// # Errors
    /// Same as [`start`](Self::start).
    pub async fn serve_until_signal(&mut self) -> Result<(), ServerError> {
        let ctx = CancellationToken::new();
        let trigger = ctx.clone();
        let bus = self.bus.clone();
        let watcher = tokio::spawn(async move {
            if let Ok(signal) = shutdown::wait_for_shutdown_signal().await {
                bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(signal));
                trigger.cancel();
            }
        });

        let res = self.start(ctx).await;
        watcher.abort();
        res
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    ///
    /// The listener lives as long as the server.
    fn subscriber_listener(&mut self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        self.listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Subscribes every pipeline and spawns its service and relay tasks.
    async fn launch(
        &self,
        set: &mut JoinSet<Result<(), ServerError>>,
        tags: &mut Tags,
        token: &CancellationToken,
    ) -> Result<(), ServerError> {
        for pipeline in &self.pipelines {
            let capacity = pipeline.capacity(self.cfg.channel_capacity_clamped());
            let (req_tx, req_rx) = mpsc::channel(capacity);
            let (resp_tx, resp_rx) = mpsc::channel(capacity);

            let spec = &pipeline.spec;
            pipeline
                .consumer
                .subscribe(spec.subject(), spec.group(), req_tx)
                .await?;

            let subject: Arc<str> = Arc::from(spec.subject());

            let service = Arc::clone(spec.service());
            let service_token = token.clone();
            let service_subject = Arc::clone(&subject);
            let handle = set.spawn(async move {
                match service.serve(service_token, req_rx, resp_tx).await {
                    Ok(()) | Err(ServiceError::Canceled) => Ok(()),
                    Err(source) => Err(ServerError::Service {
                        subject: service_subject.to_string(),
                        source,
                    }),
                }
            });
            tags.insert(handle.id(), TaskTag {
                subject: Arc::clone(&subject),
                role: ROLE_SERVICE,
            });

            let relay = Publisher::new(Arc::clone(&self.transport));
            let relay_token = token.clone();
            let relay_subject = Arc::clone(&subject);
            let handle = set.spawn(async move {
                relay
                    .run(relay_token, resp_rx)
                    .await
                    .map_err(|source| ServerError::Relay {
                        subject: relay_subject.to_string(),
                        source,
                    })
            });
            tags.insert(handle.id(), TaskTag {
                subject: Arc::clone(&subject),
                role: ROLE_RELAY,
            });

            self.bus.publish(
                Event::new(EventKind::PipelineStarting)
                    .with_subject(subject)
                    .with_group(spec.group()),
            );
        }
        Ok(())
    }

    /// Waits for the task group; the first failure cancels the rest.
    async fn supervise(
        &self,
        set: &mut JoinSet<Result<(), ServerError>>,
        tags: &mut Tags,
        token: &CancellationToken,
    ) -> Result<(), ServerError> {
        let mut first: Option<ServerError> = None;
        loop {
            tokio::select! {
                joined = set.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    if let Some(err) = self.on_task_exit(joined, tags) {
                        first = Some(err);
                        break;
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        if set.is_empty() {
            token.cancel();
            return first.map_or(Ok(()), Err);
        }

        let ev = Event::new(EventKind::ShutdownRequested);
        self.bus.publish(match &first {
            Some(err) => ev.with_reason(err.to_string()),
            None => ev,
        });
        token.cancel();

        let grace = self.wind_down(set, tags, &mut first).await;
        match first {
            Some(err) => Err(err),
            None => grace,
        }
    }

    /// Joins the remaining tasks within the grace period, then aborts the rest.
    ///
    /// Failures observed while winding down are recorded in `first` unless it is already set.
    async fn wind_down(
        &self,
        set: &mut JoinSet<Result<(), ServerError>>,
        tags: &mut Tags,
        first: &mut Option<ServerError>,
    ) -> Result<(), ServerError> {
        let grace = self.cfg.grace;
        let joined = tokio::time::timeout(grace, async {
            while let Some(joined) = set.join_next_with_id().await {
                if let Some(err) = self.on_task_exit(joined, tags) {
                    first.get_or_insert(err);
                }
            }
        })
        .await;

        if joined.is_ok() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        self.bus
            .publish(Event::new(EventKind::GraceExceeded).with_grace(grace));
        let mut stuck: Vec<String> = tags
            .values()
            .map(|t| format!("{}:{}", t.subject, t.role))
            .collect();
        stuck.sort_unstable();
        set.abort_all();
        while set.join_next().await.is_some() {}
        tags.clear();
        Err(ServerError::GraceExceeded { grace, stuck })
    }

    /// Publishes the exit event of one task; returns its failure, if any.
    fn on_task_exit(
        &self,
        joined: Result<(Id, Result<(), ServerError>), JoinError>,
        tags: &mut Tags,
    ) -> Option<ServerError> {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let tag = tags.remove(&id)?;
        let base = |kind| {
            Event::new(kind)
                .with_subject(Arc::clone(&tag.subject))
                .with_role(tag.role)
        };

        match joined {
            Ok((_, Ok(()))) => {
                self.bus.publish(base(EventKind::TaskStopped));
                None
            }
            Ok((_, Err(err))) => {
                let kind = match &err {
                    ServerError::Relay { .. } => EventKind::RelayFailed,
                    _ => EventKind::ServiceFailed,
                };
                self.bus.publish(base(kind).with_reason(err.to_string()));
                Some(err)
            }
            Err(e) if e.is_panic() => {
                let info = panic_message(e.into_panic().as_ref());
                self.bus.publish(base(EventKind::TaskPanicked).with_reason(info));
                Some(ServerError::Panicked {
                    subject: tag.subject.to_string(),
                    role: tag.role,
                })
            }
            Err(_) => None,
        }
    }

    /// Closes every pipeline's subscription in registration order, best effort.
    async fn teardown(&self) {
        for pipeline in &self.pipelines {
            // Failures are reported as DrainFailed by the consumer.
            let _ = pipeline.consumer.close().await;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceFn;
    use crate::transport::{MemoryTransport, Message};
    use std::time::Duration;

    async fn wait_cancel(
        ctx: CancellationToken,
        _rx: mpsc::Receiver<Message>,
        _tx: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        ctx.cancelled().await;
        Err(ServiceError::Canceled)
    }

    async fn fail(
        _ctx: CancellationToken,
        _rx: mpsc::Receiver<Message>,
        _tx: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        Err(ServiceError::fail("boom"))
    }

    async fn panics(
        _ctx: CancellationToken,
        _rx: mpsc::Receiver<Message>,
        _tx: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        panic!("service exploded")
    }

    async fn stubborn(
        _ctx: CancellationToken,
        _rx: mpsc::Receiver<Message>,
        _tx: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn server(nc: &Arc<MemoryTransport>) -> Server {
        Server::new(nc.clone())
    }

    #[tokio::test]
    async fn test_start_without_pipelines() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        let err = srv.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::NoPipelines));
        // Still idle: registration remains possible.
        srv.register("a", "", ServiceFn::arc(wait_cancel)).unwrap();
    }

    #[tokio::test]
    async fn test_register_after_start_is_rejected() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("a", "", ServiceFn::arc(fail)).unwrap();
        assert!(srv.start(CancellationToken::new()).await.is_err());

        assert!(matches!(
            srv.register("b", "", ServiceFn::arc(fail)),
            Err(ServerError::NotIdle)
        ));
        assert!(matches!(
            srv.start(CancellationToken::new()).await,
            Err(ServerError::NotIdle)
        ));
    }

    #[tokio::test]
    async fn test_caller_cancellation_is_clean_exit() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("a", "", ServiceFn::arc(wait_cancel)).unwrap();
        srv.register("b", "g", ServiceFn::arc(wait_cancel)).unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();
        srv.start(ctx).await.unwrap();
        assert_eq!(nc.subscription_count("a"), 0);
        assert_eq!(nc.subscription_count("b"), 0);
    }

    #[tokio::test]
    async fn test_first_failure_cancels_siblings() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("ok", "", ServiceFn::arc(wait_cancel)).unwrap();
        srv.register("bad", "", ServiceFn::arc(fail)).unwrap();

        let ctx = CancellationToken::new();
        let err = srv.start(ctx.clone()).await.unwrap_err();
        assert!(matches!(err, ServerError::Service { ref subject, .. } if subject == "bad"));
        assert!(!ctx.is_cancelled());
        assert_eq!(nc.subscription_count("ok"), 0);
        assert_eq!(nc.subscription_count("bad"), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("p", "", ServiceFn::arc(panics)).unwrap();
        srv.register("q", "", ServiceFn::arc(wait_cancel)).unwrap();

        let err = srv.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Panicked { ref subject, role: "service" } if subject == "p"
        ));
        assert_eq!(nc.subscription_count("q"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_unwinds_started_pipelines() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("good", "", ServiceFn::arc(wait_cancel)).unwrap();
        srv.register("bad..subject", "", ServiceFn::arc(wait_cancel))
            .unwrap();

        let err = srv.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::Transport { .. }));
        assert_eq!(nc.subscription_count("good"), 0);
    }

    #[tokio::test]
    async fn test_grace_exceeded_aborts_stuck_tasks() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = Server::builder(nc.clone())
            .with_config(ServerConfig {
                grace: Duration::from_millis(20),
                ..ServerConfig::default()
            })
            .build();
        srv.register("stuck", "", ServiceFn::arc(stubborn)).unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = srv.start(ctx).await.unwrap_err();
        match err {
            ServerError::GraceExceeded { stuck, .. } => {
                assert_eq!(stuck, vec!["stuck:service".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(nc.subscription_count("stuck"), 0);
    }

    #[tokio::test]
    async fn test_pipelines_labels() {
        let nc = Arc::new(MemoryTransport::new());
        let mut srv = server(&nc);
        srv.register("a", "", ServiceFn::arc(wait_cancel)).unwrap();
        srv.add(PipelineSpec::new("b", "g", ServiceFn::arc(wait_cancel)).with_capacity(4))
            .unwrap();
        assert_eq!(srv.len(), 2);
        assert_eq!(srv.pipelines(), vec!["a".to_string(), "b[g]".to_string()]);
    }
}
