use std::time::Duration;

use bytes::Bytes;
use tokio::{sync::mpsc, time};

use super::{Message, Transport};
use crate::error::TransportError;

/// Publishes a request on `subject` and waits for the first reply.
///
/// A fresh inbox is subscribed before publishing and unsubscribed afterwards,
/// whatever the outcome.
pub async fn request(
    transport: &dyn Transport,
    subject: &str,
    payload: impl Into<Bytes>,
    timeout: Duration,
) -> Result<Message, TransportError> {
    let inbox = transport.new_inbox();
    let (tx, mut rx) = mpsc::channel(1);
    let sid = transport.subscribe(&inbox, tx).await?;

    let res = match transport
        .publish(Message::new(subject, payload).with_reply(inbox))
        .await
    {
        Ok(()) => match time::timeout(timeout, rx.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(TransportError::Closed),
            Err(_elapsed) => Err(TransportError::Timeout(timeout)),
        },
        Err(e) => Err(e),
    };

    let _ = transport.unsubscribe(sid).await;
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[tokio::test]
    async fn test_request_times_out_without_responder() {
        let nc = MemoryTransport::new();
        let err = request(&nc, "nobody.home", "x", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(Duration::from_millis(20)));
        assert_eq!(nc.total_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_request_receives_reply() {
        let nc = std::sync::Arc::new(MemoryTransport::new());
        let (tx, mut rx) = mpsc::channel(1);
        nc.subscribe("svc.upper", tx).await.unwrap();

        let responder = {
            let nc = nc.clone();
            tokio::spawn(async move {
                let req = rx.recv().await.unwrap();
                let body = String::from_utf8_lossy(&req.payload).to_uppercase();
                nc.publish(req.respond(body).unwrap()).await.unwrap();
            })
        };

        let reply = request(nc.as_ref(), "svc.upper", "abc", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.payload, "ABC");
        responder.await.unwrap();
    }
}
