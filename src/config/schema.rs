//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the transport client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the server lives.
    pub endpoint: EndpointConfig,

    /// Routing preference between socket and fallback.
    pub transport: TransportConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Reconnect policy for the socket.
    pub reconnect: ReconnectConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// WebSocket URL (e.g., "ws://127.0.0.1:8080/events").
    pub socket_url: String,

    /// Base URL for the HTTP fallback (e.g., "http://127.0.0.1:8080").
    pub http_base_url: String,

    /// Prefix prepended to paths in socket Request envelopes (e.g., "/api").
    pub api_prefix: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:8080/events".to_string(),
            http_base_url: "http://127.0.0.1:8080".to_string(),
            api_prefix: String::new(),
        }
    }
}

/// Transport routing preference. Reloadable at runtime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Route every call over HTTP even when the socket is open.
    pub prefer_fallback: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            prefer_fallback: true,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// WebSocket handshake timeout in seconds.
    pub connect_secs: u64,

    /// Per-call deadline in seconds, across either transport (0 = none).
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Reconnect configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reopen the socket after it is lost.
    pub enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}
