//! Envelope types and the JSON wire codec.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire `method` for a topic subscription.
pub const SUBSCRIBE: &str = "Subscribe";
/// Wire `method` for a topic unsubscription.
pub const UNSUBSCRIBE: &str = "Unsubscribe";
/// Wire `method` for a correlated request.
pub const HTTP_REQUEST: &str = "HttpRequest";
/// Wire `method` for a correlated response.
pub const HTTP_RESPONSE: &str = "HttpResponse";

/// Correlation id linking a Request to its Response.
pub type CorrelationId = u64;

/// Request method carried inside a Request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub method: Method,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
}

/// Body of a Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub status: u16,
    #[serde(rename = "statusText", default)]
    pub status_text: String,
    #[serde(default)]
    pub entity: Value,
}

impl ResponsePayload {
    /// Conventional HTTP success: anything below 400.
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// One discrete message exchanged over the Connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Request { id: CorrelationId, request: RequestPayload },
    Response { id: CorrelationId, response: ResponsePayload },
    /// A Response whose id is readable but whose body is not.
    MalformedResponse { id: CorrelationId, error: String },
    Event { topic: String, payload: Value },
}

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not valid JSON or lacks the `method` field.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A correlated envelope arrived without an id.
    #[error("{0} envelope without correlation id")]
    MissingId(&'static str),

    /// Subscribe/Unsubscribe whose entity is not a topic string.
    #[error("{0} envelope without topic")]
    MissingTopic(&'static str),

    /// Inbound-only variant handed to the encoder.
    #[error("{0} envelope cannot be encoded")]
    Unencodable(&'static str),
}

/// The on-the-wire shape shared by every envelope kind.
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<CorrelationId>,
    #[serde(default)]
    entity: Value,
}

impl Envelope {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Subscribe { .. } => "subscribe",
            Envelope::Unsubscribe { .. } => "unsubscribe",
            Envelope::Request { .. } => "request",
            Envelope::Response { .. } => "response",
            Envelope::MalformedResponse { .. } => "malformed_response",
            Envelope::Event { .. } => "event",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        let wire = match self {
            Envelope::Subscribe { topic } => WireEnvelope {
                method: SUBSCRIBE.to_string(),
                id: Some(0),
                entity: Value::String(topic.clone()),
            },
            Envelope::Unsubscribe { topic } => WireEnvelope {
                method: UNSUBSCRIBE.to_string(),
                id: Some(0),
                entity: Value::String(topic.clone()),
            },
            Envelope::Request { id, request } => WireEnvelope {
                method: HTTP_REQUEST.to_string(),
                id: Some(*id),
                entity: serde_json::to_value(request)?,
            },
            Envelope::Response { id, response } => WireEnvelope {
                method: HTTP_RESPONSE.to_string(),
                id: Some(*id),
                entity: serde_json::to_value(response)?,
            },
            Envelope::MalformedResponse { .. } => return Err(CodecError::Unencodable(self.kind())),
            Envelope::Event { topic, payload } => WireEnvelope {
                method: topic.clone(),
                id: None,
                entity: payload.clone(),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parse a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Self::from_wire(serde_json::from_str(text)?)
    }

    /// Parse a JSON binary frame.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_wire(serde_json::from_slice(bytes)?)
    }

    fn from_wire(wire: WireEnvelope) -> Result<Self, CodecError> {
        match wire.method.as_str() {
            SUBSCRIBE => Ok(Envelope::Subscribe {
                topic: topic_of(wire.entity, SUBSCRIBE)?,
            }),
            UNSUBSCRIBE => Ok(Envelope::Unsubscribe {
                topic: topic_of(wire.entity, UNSUBSCRIBE)?,
            }),
            HTTP_REQUEST => Ok(Envelope::Request {
                id: wire.id.ok_or(CodecError::MissingId(HTTP_REQUEST))?,
                request: serde_json::from_value(wire.entity)?,
            }),
            HTTP_RESPONSE => {
                let id = wire.id.ok_or(CodecError::MissingId(HTTP_RESPONSE))?;
                // Once the id is known the caller must hear back, even if the body is unusable.
                match serde_json::from_value(wire.entity) {
                    Ok(response) => Ok(Envelope::Response { id, response }),
                    Err(e) => Ok(Envelope::MalformedResponse {
                        id,
                        error: e.to_string(),
                    }),
                }
            }
            _ => Ok(Envelope::Event {
                topic: wire.method,
                payload: wire.entity,
            }),
        }
    }
}

fn topic_of(entity: Value, method: &'static str) -> Result<String, CodecError> {
    match entity {
        Value::String(topic) => Ok(topic),
        _ => Err(CodecError::MissingTopic(method)),
    }
}
