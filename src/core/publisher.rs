//! # Outbound relay of one pipeline.
//!
//! Forwards every response the service emits to the transport, in emission order.
//!
//! ```text
//! loop select:
//!   rx.recv() = Some(msg) ─► transport.publish(msg) ─┬─ Ok  → continue
//!                                                     ├─ Err → return Err (no retry)
//!                                                     └─ ctx.cancelled() → return Ok
//!   rx.recv() = None      ─► return Ok   (service gone)
//!   ctx.cancelled()       ─► return Ok
//! ```
//!
//! An in-flight publish is abandoned on cancellation.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{Message, TransportRef};

/// Relay from a pipeline's response channel to the transport.
pub(crate) struct Publisher {
    transport: TransportRef,
}

impl Publisher {
    pub(crate) fn new(transport: TransportRef) -> Self {
        Self { transport }
    }

    /// Runs until cancellation, end of the response stream, or the first publish failure.
    pub(crate) async fn run(
        self,
        ctx: CancellationToken,
        mut rx: mpsc::Receiver<Message>,
    ) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => tokio::select! {
                        res = self.transport.publish(msg) => res?,
                        _ = ctx.cancelled() => return Ok(()),
                    },
                    None => return Ok(()),
                },
                _ = ctx.cancelled() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, SubscriptionId, Transport};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Transport whose publish never completes.
    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn subscribe(
            &self,
            _subject: &str,
            _tx: mpsc::Sender<Message>,
        ) -> Result<SubscriptionId, TransportError> {
            Ok(SubscriptionId(1))
        }

        async fn queue_subscribe(
            &self,
            _subject: &str,
            _group: &str,
            _tx: mpsc::Sender<Message>,
        ) -> Result<SubscriptionId, TransportError> {
            Ok(SubscriptionId(1))
        }

        async fn drain(&self, _id: SubscriptionId) -> Result<(), TransportError> {
            Ok(())
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> Result<(), TransportError> {
            Ok(())
        }

        async fn publish(&self, _msg: Message) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancellation_abandons_blocked_publish() {
        let ctx = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        tx.send(Message::new("client.inbox", "x")).await.unwrap();

        let relay = tokio::spawn(Publisher::new(Arc::new(Stalled)).run(ctx.clone(), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!relay.is_finished());

        ctx.cancel();
        let res = tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay ignored cancellation")
            .unwrap();
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_forwards_in_order() {
        let nc = Arc::new(MemoryTransport::new());
        let (sub_tx, mut sub_rx) = mpsc::channel(8);
        nc.subscribe("out", sub_tx).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(Message::new("out", format!("{i}"))).await.unwrap();
        }
        drop(tx);

        Publisher::new(nc.clone())
            .run(CancellationToken::new(), rx)
            .await
            .unwrap();
        for i in 0..3 {
            let msg = sub_rx.recv().await.unwrap();
            assert_eq!(msg.payload, format!("{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_cancellation_returns_ok() {
        let ctx = CancellationToken::new();
        let (_tx, rx) = mpsc::channel(1);
        ctx.cancel();
        Publisher::new(Arc::new(MemoryTransport::new()))
            .run(ctx, rx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_stops_relay() {
        let nc = Arc::new(MemoryTransport::new());
        nc.close();
        let (tx, rx) = mpsc::channel(1);
        tx.send(Message::new("out", "x")).await.unwrap();

        let err = Publisher::new(nc)
            .run(CancellationToken::new(), rx)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }
}
