//! Error types used by the server runtime, services, transports and the mapper.
//!
//! This module defines four error enums:
//!
//! - [`ServerError`] — errors raised by the pipeline supervisor itself.
//! - [`ServiceError`] — errors returned by a processing unit ([`Service`](crate::Service)).
//! - [`TransportError`] — errors raised by a [`Transport`](crate::Transport) implementation.
//! - [`CallError`] — lookup and invocation errors of the [`Mapper`](crate::Mapper).
//!
//! Every type provides `as_label` (short stable snake_case label for logs/metrics).
//!
//! Contract violations inside [`Mapper::call`](crate::Mapper::call) are **not** represented
//! here: they panic, because they indicate a bug in the caller rather than a runtime condition.

use std::time::Duration;
use thiserror::Error;

use crate::transport::SubscriptionId;

/// Boxed error returned by registered methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the server runtime.
///
/// Configuration errors (`NoPipelines`, `AlreadySubscribed`, `NotIdle`) are returned
/// synchronously by the call that caused them. Everything else comes out of a running
/// pipeline and triggers server-wide shutdown.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    /// `start` was called with zero registered pipelines.
    #[error("cannot start the server: no services registered")]
    NoPipelines,

    /// A subscription manager already holds an active subscription.
    #[error("already subscribed to subject '{subject}'")]
    AlreadySubscribed {
        /// Subject of the active subscription.
        subject: String,
    },

    /// Registration or start attempted after the server left the idle state.
    #[error("server is not idle; pipelines can only be registered before start")]
    NotIdle,

    /// Subscribe or drain failed at the transport.
    #[error("transport error on subject '{subject}': {source}")]
    Transport {
        /// Subject of the affected pipeline.
        subject: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// A processing unit returned a failure.
    #[error("service on subject '{subject}' failed: {source}")]
    Service {
        /// Subject of the affected pipeline.
        subject: String,
        /// Error returned by the service.
        #[source]
        source: ServiceError,
    },

    /// The outbound relay could not publish a response.
    #[error("relay on subject '{subject}' failed: {source}")]
    Relay {
        /// Subject of the affected pipeline.
        subject: String,
        /// Underlying publish failure.
        #[source]
        source: TransportError,
    },

    /// A pipeline task panicked.
    #[error("{role} on subject '{subject}' panicked")]
    Panicked {
        /// Subject of the affected pipeline.
        subject: String,
        /// Which task of the pipeline panicked (`service` or `relay`).
        role: &'static str,
    },

    /// Pipeline tasks did not stop within the configured grace period and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Subjects of the pipelines whose tasks were still running.
        stuck: Vec<String>,
    },
}

impl ServerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use natsrpc::ServerError;
    ///
    /// assert_eq!(ServerError::NoPipelines.as_label(), "server_no_pipelines");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::NoPipelines => "server_no_pipelines",
            ServerError::AlreadySubscribed { .. } => "server_already_subscribed",
            ServerError::NotIdle => "server_not_idle",
            ServerError::Transport { .. } => "server_transport",
            ServerError::Service { .. } => "server_service_failed",
            ServerError::Relay { .. } => "server_relay_failed",
            ServerError::Panicked { .. } => "server_task_panicked",
            ServerError::GraceExceeded { .. } => "server_grace_exceeded",
        }
    }

    /// True for errors caused by how the server was set up rather than by a running pipeline.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ServerError::NoPipelines | ServerError::AlreadySubscribed { .. } | ServerError::NotIdle
        )
    }
}

/// # Errors returned by a processing unit.
///
/// `Canceled` is a graceful exit: the supervisor does not treat it as a pipeline failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The service observed cancellation and stopped.
    #[error("context cancelled")]
    Canceled,
}

impl ServiceError {
    /// Shorthand for [`ServiceError::Fail`].
    pub fn fail(error: impl std::fmt::Display) -> Self {
        ServiceError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Fatal { .. } => "service_fatal",
            ServiceError::Canceled => "service_canceled",
        }
    }

    /// True if this error counts as a pipeline failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ServiceError::Canceled)
    }
}

/// # Errors produced by a transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// The subscription handle is not (or no longer) known to the transport.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),

    /// Subject is empty or malformed.
    #[error("invalid subject '{0}'")]
    InvalidSubject(String),

    /// A request did not receive a reply in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport-specific failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Closed => "transport_closed",
            TransportError::UnknownSubscription(_) => "transport_unknown_subscription",
            TransportError::InvalidSubject(_) => "transport_invalid_subject",
            TransportError::Timeout(_) => "transport_timeout",
            TransportError::Other(_) => "transport_other",
        }
    }
}

/// # Errors produced by the dispatch registry.
///
/// Lookup misses are recoverable and left to the caller to encode (e.g. as a
/// "method not found" reply).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CallError {
    /// No receiver was registered under this name.
    #[error("receiver not found")]
    ReceiverNotFound,

    /// The receiver exists but has no such method.
    #[error("method not found")]
    MethodNotFound,

    /// The method ran and returned its declared failure.
    #[error("{0}")]
    Method(BoxError),

    /// A payload could not be decoded into its typed holder.
    #[error("decode {type_name}: {source}")]
    Decode {
        /// Type the payload was decoded into.
        type_name: &'static str,
        /// Codec failure.
        #[source]
        source: serde_json::Error,
    },

    /// A typed holder could not be encoded.
    #[error("encode {type_name}: {source}")]
    Encode {
        /// Type that was being encoded.
        type_name: &'static str,
        /// Codec failure.
        #[source]
        source: serde_json::Error,
    },
}

impl CallError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use natsrpc::CallError;
    ///
    /// assert_eq!(CallError::MethodNotFound.as_label(), "method_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CallError::ReceiverNotFound => "receiver_not_found",
            CallError::MethodNotFound => "method_not_found",
            CallError::Method(_) => "method_failed",
            CallError::Decode { .. } => "payload_decode",
            CallError::Encode { .. } => "payload_encode",
        }
    }

    /// True for `ReceiverNotFound` and `MethodNotFound`.
    pub fn is_lookup(&self) -> bool {
        matches!(self, CallError::ReceiverNotFound | CallError::MethodNotFound)
    }
}
