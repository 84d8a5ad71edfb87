//! Metrics collection and exposition.
//!
//! # Metrics
//! - `transport_calls_total` (counter): calls by route, outcome
//! - `transport_call_duration_seconds` (histogram): call latency by route
//! - `transport_connection_open` (gauge): 1=open, 0=not open
//! - `transport_pending_calls` (gauge): outstanding correlated calls
//! - `transport_unmatched_responses_total` (counter): late/duplicate/unknown responses
//! - `transport_protocol_errors_total` (counter): undecodable or unexpected envelopes
//! - `transport_handler_panics_total` (counter): event handlers that panicked

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::transport::types::{Route, TransportError, TransportResult};

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome and latency of one call.
pub fn record_call<T>(route: Route, result: &TransportResult<T>, started: Instant) {
    let outcome = match result {
        Ok(_) => "success",
        Err(TransportError::Api(_)) => "api_error",
        Err(_) => "transport_error",
    };
    counter!("transport_calls_total", "route" => route.as_str(), "outcome" => outcome).increment(1);
    histogram!("transport_call_duration_seconds", "route" => route.as_str())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_connection_state(open: bool) {
    gauge!("transport_connection_open").set(if open { 1.0 } else { 0.0 });
}

pub fn record_pending_calls(count: usize) {
    gauge!("transport_pending_calls").set(count as f64);
}

pub fn record_unmatched_response() {
    counter!("transport_unmatched_responses_total").increment(1);
}

pub fn record_protocol_error() {
    counter!("transport_protocol_errors_total").increment(1);
}

pub fn record_handler_panic() {
    counter!("transport_handler_panics_total").increment(1);
}
