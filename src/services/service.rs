//! # Service abstraction.
//!
//! A [`Service`] is the processing unit of one pipeline. It is driven by the server with:
//! - a [`CancellationToken`] shared by every task of the server,
//! - the request stream fed by the pipeline's subscription,
//! - the response stream drained by the pipeline's relay.
//!
//! ```text
//! transport ─► [requests] ─► Service::serve ─► [responses] ─► relay ─► transport.publish
//! ```
//!
//! Every blocking wait inside a service must race the token; [`next_request`] and
//! [`reply`] do exactly that.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;
use crate::transport::Message;

/// Shared handle to a service.
pub type ServiceRef = Arc<dyn Service>;

/// # Pluggable request processor.
///
/// Returning `Ok(())` or `Err(ServiceError::Canceled)` is a graceful exit; any other
/// error is a pipeline failure that shuts the whole server down.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use natsrpc::{Message, Service, ServiceError, next_request, reply};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Service for Echo {
///     async fn serve(
///         &self,
///         ctx: CancellationToken,
///         mut requests: mpsc::Receiver<Message>,
///         responses: mpsc::Sender<Message>,
///     ) -> Result<(), ServiceError> {
///         loop {
///             let req = next_request(&ctx, &mut requests).await?;
///             if let Some(resp) = req.respond(req.payload.clone()) {
///                 reply(&ctx, &responses, resp).await?;
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Consumes requests and produces responses until cancellation.
    async fn serve(
        &self,
        ctx: CancellationToken,
        requests: mpsc::Receiver<Message>,
        responses: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError>;
}

/// Waits for the next request or cancellation.
///
/// # Errors
/// - [`ServiceError::Canceled`] once `ctx` is cancelled;
/// - [`ServiceError::Fatal`] if the transport dropped the request stream.
pub async fn next_request(
    ctx: &CancellationToken,
    requests: &mut mpsc::Receiver<Message>,
) -> Result<Message, ServiceError> {
    tokio::select! {
        msg = requests.recv() => msg.ok_or_else(|| ServiceError::Fatal {
            error: "request stream closed".to_string(),
        }),
        _ = ctx.cancelled() => Err(ServiceError::Canceled),
    }
}

/// Queues a response for the relay, waiting for capacity or cancellation.
///
/// # Errors
/// - [`ServiceError::Canceled`] once `ctx` is cancelled (the response is discarded);
/// - [`ServiceError::Fatal`] if the relay is gone.
pub async fn reply(
    ctx: &CancellationToken,
    responses: &mpsc::Sender<Message>,
    msg: Message,
) -> Result<(), ServiceError> {
    tokio::select! {
        res = responses.send(msg) => res.map_err(|_| ServiceError::Fatal {
            error: "response stream closed".to_string(),
        }),
        _ = ctx.cancelled() => Err(ServiceError::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_request_observes_cancellation() {
        let ctx = CancellationToken::new();
        let (_tx, mut rx) = mpsc::channel::<Message>(1);
        ctx.cancel();
        let err = next_request(&ctx, &mut rx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Canceled));
    }

    #[tokio::test]
    async fn test_next_request_closed_stream_is_fatal() {
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<Message>(1);
        drop(tx);
        let err = next_request(&ctx, &mut rx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Fatal { .. }));
    }

    #[tokio::test]
    async fn test_reply_blocked_send_is_cancellable() {
        let ctx = CancellationToken::new();
        let (tx, _rx) = mpsc::channel::<Message>(1);
        reply(&ctx, &tx, Message::new("a", "1")).await.unwrap();

        let cancel = ctx.clone();
        tokio::spawn(async move { cancel.cancel() });
        let err = reply(&ctx, &tx, Message::new("a", "2")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Canceled));
    }
}
