//! Message model for the Conveyor pipeline.
//!
//! A transport delivers an [`InboundMessage`]: an opaque JSON body plus a
//! string header map. Business code works with typed messages instead; a type
//! becomes a message by implementing [`Message`], usually through
//! `#[derive(Message)]` from `conveyor-macros`.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MessageError, MessageResult};

/// Well-known header names.
///
/// Header names are stored lower-case.
pub mod headers {
    /// Unique id assigned to every message by the bus.
    pub const MESSAGE_ID: &str = "msg-id";
    /// Declared message type, matched against [`Message::MESSAGE_TYPE`](super::Message::MESSAGE_TYPE).
    pub const MESSAGE_TYPE: &str = "msg-type";
    /// Input queue address of the sending endpoint.
    pub const SENDER_ADDRESS: &str = "sender-address";
    /// Transport-level correlation id.
    pub const CORRELATION_ID: &str = "corr-id";
    /// Unix timestamp (milliseconds) at which the message was sent.
    pub const SENT_TIME: &str = "sent-time";
    /// Id of the originating request.
    pub const REQUEST_ID: &str = "request-id";
    /// Correlation context propagated across services.
    pub const CORRELATION_CONTEXT: &str = "correlation-context";
    /// Email of the principal on whose behalf the message was sent.
    pub const EMAIL: &str = "email";
}

/// Binds a Rust type to the name it travels under.
///
/// # Example
///
/// ```rust,ignore
/// use conveyor_macros::Message;
///
/// #[derive(Serialize, Deserialize, Message)]
/// #[message(name = "OrderPlaced")]
/// struct OrderPlaced {
///     order_id: u64,
/// }
/// ```
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The value of the `msg-type` header for this message.
    const MESSAGE_TYPE: &'static str;
}

// =============================================================================
// Headers
// =============================================================================

/// The string header map attached to every transport message.
///
/// Keys are normalized to lower case on insertion, including when a map is
/// deserialized off the wire; iteration order is sorted by key so serialized
/// headers are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any previous value under the same
    /// (case-insensitive) name.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.as_ref().to_lowercase(), value.into())
    }

    /// Inserts a header only if it is not already present.
    pub fn insert_if_absent(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .entry(key.as_ref().to_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value of a header.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(value) => Some(value.as_str()),
            None => self.0.get(&key.to_lowercase()).map(String::as_str),
        }
    }

    /// Returns `true` if the header is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Headers> for BTreeMap<String, String> {
    fn from(headers: Headers) -> Self {
        headers.0
    }
}

// =============================================================================
// Inbound / Outbound
// =============================================================================

/// A message as delivered by the transport to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport headers.
    pub headers: Headers,
    /// Opaque JSON payload.
    pub body: Value,
}

impl InboundMessage {
    /// Creates an inbound message from raw parts.
    pub fn new(headers: Headers, body: Value) -> Self {
        Self { headers, body }
    }

    /// Builds an inbound message carrying a typed event, as a transport
    /// would after receiving it. Used by tests and in-process transports.
    pub fn from_event<E: Message>(event: &E) -> MessageResult<Self> {
        let body = serde_json::to_value(event).map_err(MessageError::Encode)?;
        let headers = Headers::new()
            .with(headers::MESSAGE_TYPE, E::MESSAGE_TYPE)
            .with(headers::MESSAGE_ID, uuid::Uuid::new_v4().to_string());
        Ok(Self { headers, body })
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// The `msg-type` header.
    pub fn message_type(&self) -> Option<&str> {
        self.headers.get(headers::MESSAGE_TYPE)
    }

    /// The `sender-address` header.
    pub fn sender(&self) -> Option<&str> {
        self.headers.get(headers::SENDER_ADDRESS)
    }

    /// The `msg-id` header.
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(headers::MESSAGE_ID)
    }

    /// Deserializes the body into `M`.
    pub fn decode<M: Message>(&self) -> MessageResult<M> {
        M::deserialize(&self.body).map_err(|source| MessageError::Decode {
            message_type: M::MESSAGE_TYPE.to_string(),
            source,
        })
    }
}

/// A message handed to the transport for sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Explicit destination queue; `None` means publish to subscribers.
    pub destination: Option<String>,
    /// Transport headers.
    pub headers: Headers,
    /// JSON payload.
    pub body: Value,
}

impl OutboundMessage {
    /// Serializes a typed event into an outbound message with its
    /// `msg-type` header set.
    pub fn from_event<E: Message>(event: &E) -> MessageResult<Self> {
        let body = serde_json::to_value(event).map_err(MessageError::Encode)?;
        Ok(Self {
            destination: None,
            headers: Headers::new().with(headers::MESSAGE_TYPE, E::MESSAGE_TYPE),
            body,
        })
    }

    /// Routes the message to a specific queue instead of publishing it.
    pub fn to(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Builder-style header insertion.
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

impl From<OutboundMessage> for InboundMessage {
    fn from(message: OutboundMessage) -> Self {
        Self {
            headers: message.headers,
            body: message.body,
        }
    }
}

/// Milliseconds since the Unix epoch, used for the `sent-time` header.
pub(crate) fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl Message for OrderPlaced {
        const MESSAGE_TYPE: &'static str = "OrderPlaced";
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let headers = Headers::new().with("Sender-Address", "svc-a");
        assert_eq!(headers.get("sender-address"), Some("svc-a"));
        assert_eq!(headers.get("SENDER-ADDRESS"), Some("svc-a"));
    }

    #[test]
    fn test_wire_headers_are_normalized() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"headers":{"Msg-Type":"OrderPlaced","Sender-Address":"svc-a"},"body":{}}"#,
        )
        .unwrap();
        assert_eq!(msg.message_type(), Some("OrderPlaced"));
        assert_eq!(msg.sender(), Some("svc-a"));

        let wire = serde_json::to_value(&msg.headers).unwrap();
        assert_eq!(wire, json!({ "msg-type": "OrderPlaced", "sender-address": "svc-a" }));
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let mut headers = Headers::new().with(headers::MESSAGE_ID, "first");
        headers.insert_if_absent(headers::MESSAGE_ID, "second");
        assert_eq!(headers.get(headers::MESSAGE_ID), Some("first"));
    }

    #[test]
    fn test_inbound_from_event() {
        let msg = InboundMessage::from_event(&OrderPlaced { order_id: 42 }).unwrap();
        assert_eq!(msg.message_type(), Some("OrderPlaced"));
        assert!(msg.message_id().is_some());
        assert_eq!(msg.body, json!({ "order_id": 42 }));
    }

    #[test]
    fn test_decode_mismatched_body() {
        let msg = InboundMessage::new(
            Headers::new().with(headers::MESSAGE_TYPE, "OrderPlaced"),
            json!({ "unexpected": true }),
        );
        let err = msg.decode::<OrderPlaced>().unwrap_err();
        assert!(matches!(err, MessageError::Decode { ref message_type, .. } if message_type == "OrderPlaced"));
    }

    #[test]
    fn test_outbound_into_inbound_keeps_headers() {
        let out = OutboundMessage::from_event(&OrderPlaced { order_id: 7 })
            .unwrap()
            .with_header(headers::SENDER_ADDRESS, "svc-a");
        let inbound = InboundMessage::from(out);
        assert_eq!(inbound.sender(), Some("svc-a"));
        assert_eq!(inbound.decode::<OrderPlaced>().unwrap(), OrderPlaced { order_id: 7 });
    }
}
