//! # Mapper-backed service.
//!
//! [`DispatchService`] is the glue between a pipeline and a [`Mapper`]: it decodes
//! each request as a JSON [`DispatchRequest`], routes it to `receiver.method`,
//! and replies with a JSON [`DispatchReply`] on the request's reply subject.
//!
//! ```text
//! request {"receiver":"Echo","method":"Echo","params":{...}}
//!    └─► mapper.params() ─► Value::decode_json(params) ─► mapper.call()
//!           ├─ Ok(value)  ─► {"result": <value as JSON>}
//!           └─ Err(e)     ─► {"error": {"code": e.as_label(), "message": e}}
//! ```
//!
//! Requests are handled one at a time, in delivery order. Requests without a reply
//! subject are dropped and reported as `EventKind::RequestDropped`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CallError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::mapper::Mapper;
use crate::services::service::{Service, next_request, reply};
use crate::transport::Message;

/// Wire form of a dispatched call.
#[derive(Serialize, Deserialize, Debug)]
pub struct DispatchRequest {
    /// Receiver name.
    pub receiver: String,
    /// Method name.
    pub method: String,
    /// Method parameters; absent means the zero value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl DispatchRequest {
    /// Builds a request, encoding `params` as JSON.
    pub fn new<P: Serialize>(
        receiver: impl Into<String>,
        method: impl Into<String>,
        params: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            receiver: receiver.into(),
            method: method.into(),
            params: Some(serde_json::value::to_raw_value(params)?),
        })
    }

    /// Encodes the request as a message body.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Error part of a [`DispatchReply`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DispatchFault {
    /// Stable snake_case code (`receiver_not_found`, `method_failed`, ...).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Wire form of a dispatched call's outcome: exactly one of `result`/`error` is set.
#[derive(Serialize, Deserialize, Debug)]
pub struct DispatchReply {
    /// Encoded method result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchFault>,
}

impl DispatchReply {
    fn fault(code: &str, message: impl ToString) -> Self {
        Self {
            result: None,
            error: Some(DispatchFault {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    /// Decodes a reply from a message body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Decodes the result as `T`; `None` if the reply carries an error.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.result
            .as_deref()
            .map(|raw| serde_json::from_str(raw.get()))
            .transpose()
    }
}

/// Service answering [`DispatchRequest`]s from a shared [`Mapper`].
pub struct DispatchService {
    mapper: Arc<Mapper>,
    bus: Option<Bus>,
}

impl DispatchService {
    /// Creates a dispatcher over `mapper`.
    pub fn new(mapper: Arc<Mapper>) -> Self {
        Self { mapper, bus: None }
    }

    /// Reports dropped requests on the server's event bus.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Handles one request body. Never fails: problems become error replies.
    pub fn handle(&self, payload: &[u8]) -> DispatchReply {
        let req: DispatchRequest = match serde_json::from_slice(payload) {
            Ok(req) => req,
            Err(e) => return DispatchReply::fault("bad_request", e),
        };

        match self.call(&req) {
            Ok(result) => DispatchReply {
                result: Some(result),
                error: None,
            },
            Err(e) => DispatchReply::fault(e.as_label(), e),
        }
    }

    fn call(&self, req: &DispatchRequest) -> Result<Box<RawValue>, CallError> {
        let mut params = self.mapper.params(&req.receiver, &req.method)?;
        if let Some(raw) = &req.params {
            params.decode_json(raw.get().as_bytes())?;
        }
        let result = self.mapper.call(&req.receiver, &req.method, params)?;
        let type_name = result.type_name();
        let encoded = result.encode_json()?;
        let json = String::from_utf8_lossy(&encoded).into_owned();
        RawValue::from_string(json).map_err(|source| CallError::Encode { type_name, source })
    }

    fn drop_request(&self, subject: &str, reason: &str) {
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(EventKind::RequestDropped)
                    .with_subject(subject)
                    .with_reason(reason),
            );
        }
    }
}

#[async_trait]
impl Service for DispatchService {
    async fn serve(
        &self,
        ctx: CancellationToken,
        mut requests: mpsc::Receiver<Message>,
        responses: mpsc::Sender<Message>,
    ) -> Result<(), ServiceError> {
        loop {
            let req = next_request(&ctx, &mut requests).await?;
            let Some(reply_to) = req.reply.as_deref() else {
                self.drop_request(&req.subject, "no reply subject");
                continue;
            };

            let body = serde_json::to_vec(&self.handle(&req.payload)).map_err(ServiceError::fail)?;
            reply(&ctx, &responses, Message::new(reply_to, body)).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn service() -> DispatchService {
        let mapper = Mapper::new();
        mapper.add("Math", "Square", |n: i64| Ok::<_, Infallible>(n * n));
        mapper.add("Math", "Fail", |_: ()| Err::<(), _>("nope"));
        DispatchService::new(Arc::new(mapper))
    }

    #[test]
    fn test_handle_success() {
        let req = DispatchRequest::new("Math", "Square", &7i64).unwrap();
        let reply = service().handle(&req.to_vec().unwrap());
        assert!(reply.error.is_none());
        assert_eq!(reply.result_as::<i64>().unwrap(), Some(49));
    }

    #[test]
    fn test_handle_missing_params_uses_zero_value() {
        let reply = service().handle(br#"{"receiver":"Math","method":"Square"}"#);
        assert_eq!(reply.result_as::<i64>().unwrap(), Some(0));
    }

    #[test]
    fn test_handle_lookup_errors() {
        let svc = service();
        let reply = svc.handle(br#"{"receiver":"Nope","method":"Square"}"#);
        assert_eq!(reply.error.unwrap().code, "receiver_not_found");
        let reply = svc.handle(br#"{"receiver":"Math","method":"Cube"}"#);
        assert_eq!(reply.error.unwrap().code, "method_not_found");
    }

    #[test]
    fn test_handle_method_failure() {
        let reply = service().handle(br#"{"receiver":"Math","method":"Fail","params":null}"#);
        let fault = reply.error.unwrap();
        assert_eq!(fault.code, "method_failed");
        assert_eq!(fault.message, "nope");
    }

    #[test]
    fn test_handle_bad_params_and_bad_request() {
        let svc = service();
        let reply = svc.handle(br#"{"receiver":"Math","method":"Square","params":"x"}"#);
        assert_eq!(reply.error.unwrap().code, "payload_decode");
        let reply = svc.handle(b"garbage");
        assert_eq!(reply.error.unwrap().code, "bad_request");
    }

    #[test]
    fn test_handle_unencodable_result() {
        use std::collections::HashMap;

        let mapper = Mapper::new();
        // JSON object keys must be strings.
        mapper.add("Grid", "Cells", |_: ()| {
            Ok::<_, Infallible>(HashMap::from([((0u8, 1u8), 2u8)]))
        });
        let svc = DispatchService::new(Arc::new(mapper));
        let reply = svc.handle(br#"{"receiver":"Grid","method":"Cells"}"#);
        assert!(reply.result.is_none());
        assert_eq!(reply.error.unwrap().code, "payload_encode");
    }

    #[tokio::test]
    async fn test_serve_replies_and_drops_requests_without_reply() {
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let svc = service().with_bus(bus);
        let ctx = CancellationToken::new();
        let (req_tx, req_rx) = mpsc::channel(4);
        let (resp_tx, mut resp_rx) = mpsc::channel(4);

        let body = DispatchRequest::new("Math", "Square", &3i64)
            .unwrap()
            .to_vec()
            .unwrap();
        req_tx
            .send(Message::new("rpc.math", body.clone()))
            .await
            .unwrap();
        req_tx
            .send(Message::new("rpc.math", body).with_reply("_INBOX.7"))
            .await
            .unwrap();

        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { svc.serve(ctx, req_rx, resp_tx).await })
        };

        let resp = resp_rx.recv().await.unwrap();
        assert_eq!(resp.subject, "_INBOX.7");
        let reply = DispatchReply::from_slice(&resp.payload).unwrap();
        assert_eq!(reply.result_as::<i64>().unwrap(), Some(9));

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::RequestDropped);

        ctx.cancel();
        let res = task.await.unwrap();
        assert!(matches!(res, Err(ServiceError::Canceled)));
    }
}
