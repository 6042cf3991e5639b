use std::fmt;

use bytes::Bytes;

/// Addressed message envelope.
///
/// The payload is opaque to the server; encoding is the service's concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Subject the message is published to.
    pub subject: String,
    /// Optional reply subject the receiver should respond to.
    pub reply: Option<String>,
    /// Opaque body.
    pub payload: Bytes,
}

impl Message {
    /// Creates a message without reply subject.
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            payload: payload.into(),
        }
    }

    /// Sets the reply subject.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Builds the response to this message, addressed to its reply subject.
    ///
    /// Returns `None` when the sender did not ask for a reply.
    pub fn respond(&self, payload: impl Into<Bytes>) -> Option<Message> {
        self.reply
            .as_deref()
            .map(|reply| Message::new(reply, payload))
    }
}

/// Opaque handle of one transport subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid:{}", self.0)
    }
}
