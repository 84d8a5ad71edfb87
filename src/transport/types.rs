//! Call outcomes and error definitions shared by both transports.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Server-reported failure (status >= 400), identical in shape for both transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub body: Value,
    pub url: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.status, self.status_text, self.url)
    }
}

/// Errors a transport call can end with.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket closed while the call was pending, or before it was sent.
    #[error("Connection lost")]
    ConnectionLost,

    /// Caller-level timeout expired.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with status >= 400.
    #[error("Request failed: {0}")]
    Api(ApiError),

    /// The fallback HTTP client failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A response body could not be read.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Server-supplied detail, when the failure is an application error.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            TransportError::Api(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.api().map(|detail| detail.status)
    }

    /// True for failures of the transport itself rather than the server's answer.
    pub fn is_transport_failure(&self) -> bool {
        !matches!(self, TransportError::Api(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Map a status/body pair to a call outcome: < 400 succeeds, >= 400 fails.
pub fn outcome(status: u16, status_text: String, body: Value, url: &str) -> TransportResult<Value> {
    if status < 400 {
        Ok(body)
    } else {
        Err(TransportError::Api(ApiError {
            status,
            status_text,
            body,
            url: url.to_string(),
        }))
    }
}

/// Which transport served (or would serve) a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Socket,
    Fallback,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Socket => "socket",
            Route::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
