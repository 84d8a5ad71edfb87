//! Conventional request/response transport used when the socket is unavailable.

use std::future::Future;

use reqwest::Client;
use serde_json::Value;

use crate::protocol::Method;
use crate::transport::types::{outcome, TransportError, TransportResult};

/// A blocking-per-call request/response client.
///
/// Results must follow the same shape as the socket bridge: the response body
/// on status < 400, [`TransportError::Api`] on status >= 400.
pub trait FallbackTransport: Send + Sync + 'static {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> impl Future<Output = TransportResult<Value>> + Send;

    fn get(&self, path: &str) -> impl Future<Output = TransportResult<Value>> + Send {
        self.request(Method::Get, path, None)
    }

    fn post(&self, path: &str, body: Value) -> impl Future<Output = TransportResult<Value>> + Send {
        self.request(Method::Post, path, Some(body))
    }

    fn delete(&self, path: &str) -> impl Future<Output = TransportResult<Value>> + Send {
        self.request(Method::Delete, path, None)
    }
}

/// HTTP fallback built on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    client: Client,
    base_url: String,
}

impl HttpFallback {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl FallbackTransport for HttpFallback {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> impl Future<Output = TransportResult<Value>> + Send {
        let url = self.url(path);
        let mut builder = self.client.request(http_method(method), &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        async move {
            tracing::debug!(method = %method, url = %url, "Sending HTTP request");
            let response = builder.send().await?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))?;

            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            outcome(status.as_u16(), status_text, parse_body(&text), &url)
        }
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Empty → null, JSON → parsed, anything else → the raw text.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
