//! # Message Envelope
//!
//! The three message shapes exchanged with the device. Requests only travel
//! client → device (batched in a JSON array); responses and broadcasts only
//! travel device → client, one JSON object per frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;

/// Sequence number correlating a response with its request.
pub type Seq = i32;

/// Wire tag of a request.
pub const TYPE_REQUEST: &str = "request";
/// Wire tag of a response.
pub const TYPE_RESPONSE: &str = "response";
/// Wire tag of a broadcast.
pub const TYPE_BROADCAST: &str = "broadcast";

/// Well-known operation names understood by every esp32m module.
pub mod names {
    pub const STATE_GET: &str = "state-get";
    pub const STATE_SET: &str = "state-set";
    pub const CONFIG_GET: &str = "config-get";
    pub const CONFIG_SET: &str = "config-set";
    pub const INFO_GET: &str = "info-get";
}

/// A request addressed to one module (or to all modules when `target` is
/// absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<String>,
    pub name: String,
    pub seq: Seq,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

impl Request {
    pub fn new(target: Option<String>, name: impl Into<String>, seq: Seq, data: Option<Value>) -> Self {
        Self {
            target,
            name: name.into(),
            seq,
            data,
        }
    }

    /// Serialize with the `type` tag, exactly as it goes on the wire.
    pub fn to_wire(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), Value::from(TYPE_REQUEST));
        if let Some(target) = &self.target {
            obj.insert("target".into(), Value::from(target.as_str()));
        }
        obj.insert("name".into(), Value::from(self.name.as_str()));
        obj.insert("seq".into(), Value::from(self.seq));
        if let Some(data) = &self.data {
            obj.insert("data".into(), data.clone());
        }
        Value::Object(obj)
    }

    /// Encode a batch of requests as one outbound text frame.
    pub fn encode_batch<'a>(requests: impl IntoIterator<Item = &'a Request>) -> String {
        Value::Array(requests.into_iter().map(Request::to_wire).collect()).to_string()
    }

    /// Whether `other` would ask the device for exactly the same thing.
    pub fn is_equivalent(&self, target: Option<&str>, name: &str, data: Option<&Value>) -> bool {
        self.target.as_deref() == target && self.name == name && self.data.as_ref() == data
    }
}

/// Answer (complete or partial) to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub name: String,
    pub source: String,
    pub seq: Seq,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<Value>,
}

impl Response {
    /// True when the device reported a failure for this request.
    pub fn is_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_null())
    }
}

/// Unsolicited notification pushed by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub name: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
}

/// Any tagged frame.
///
/// Frames carrying a string `type` that is not recognised, or that fail
/// envelope validation, are kept verbatim in `Other` so they can still be
/// republished.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Broadcast(Broadcast),
    Other(Value),
}

impl Message {
    /// Classify a parsed frame. Fails only when `type` is missing or not a
    /// string.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(EnvelopeError::NonStringType),
            None => return Err(EnvelopeError::MissingType),
        };

        let message = match kind.as_str() {
            TYPE_RESPONSE => match serde_json::from_value::<Response>(value.clone()) {
                Ok(response) if !response.source.is_empty() => Message::Response(response),
                _ => Message::Other(value),
            },
            TYPE_BROADCAST => match serde_json::from_value::<Broadcast>(value.clone()) {
                Ok(broadcast) if !broadcast.source.is_empty() => Message::Broadcast(broadcast),
                _ => Message::Other(value),
            },
            TYPE_REQUEST => match serde_json::from_value::<Request>(value.clone()) {
                Ok(request) => Message::Request(request),
                Err(_) => Message::Other(value),
            },
            _ => Message::Other(value),
        };
        Ok(message)
    }

    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// The `type` tag as it appeared on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Message::Request(_) => TYPE_REQUEST,
            Message::Response(_) => TYPE_RESPONSE,
            Message::Broadcast(_) => TYPE_BROADCAST,
            Message::Other(value) => value.get("type").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_broadcast(&self) -> Option<&Broadcast> {
        match self {
            Message::Broadcast(broadcast) => Some(broadcast),
            _ => None,
        }
    }

    /// Module that produced the message, if it carries one.
    pub fn source(&self) -> Option<&str> {
        match self {
            Message::Response(r) => Some(&r.source),
            Message::Broadcast(b) => Some(&b.source),
            _ => None,
        }
    }
}
