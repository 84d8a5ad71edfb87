//! Pending Call bookkeeping.
//!
//! # Responsibilities
//! - Hold exactly one completion slot per outstanding correlation id
//! - Resolve a slot at most once, removing it in the same step
//! - Drop late, duplicate, or unknown responses without side effects
//! - Fail every outstanding slot when the connection goes away

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::observability::metrics;
use crate::protocol::{CorrelationId, ResponsePayload};
use crate::transport::types::{outcome, TransportError, TransportResult};

struct PendingCall {
    url: String,
    slot: oneshot::Sender<TransportResult<Value>>,
}

/// Outstanding correlated calls for one connection.
#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<CorrelationId, PendingCall>,
    /// Set once the connection is gone; later registrations fail fast.
    closed: AtomicBool,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Pending Call for `id`.
    ///
    /// The returned slot removes the registration when dropped, so a caller
    /// that gives up (timeout, cancellation) leaves nothing behind.
    pub fn register(&self, id: CorrelationId, url: &str) -> TransportResult<PendingSlot<'_>> {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(
            id,
            PendingCall {
                url: url.to_string(),
                slot: tx,
            },
        );
        let slot = PendingSlot { calls: self, id, rx };

        // Checked after insert so a concurrent fail_all either drains this
        // entry or is observed here.
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionLost);
        }
        metrics::record_pending_calls(self.calls.len());
        Ok(slot)
    }

    /// Match a Response to its Pending Call. Returns false if none matched.
    pub fn complete(&self, id: CorrelationId, response: ResponsePayload) -> bool {
        let Some((_, call)) = self.calls.remove(&id) else {
            metrics::record_unmatched_response();
            tracing::debug!(
                correlation_id = id,
                status = response.status,
                "Dropping response with no pending call"
            );
            return false;
        };

        metrics::record_pending_calls(self.calls.len());
        let result = outcome(response.status, response.status_text, response.entity, &call.url);
        if call.slot.send(result).is_err() {
            tracing::debug!(correlation_id = id, "Caller gave up before response arrived");
        }
        true
    }

    /// Resolve one Pending Call with `error`. Returns false if none matched.
    pub fn fail(&self, id: CorrelationId, error: TransportError) -> bool {
        let Some((_, call)) = self.calls.remove(&id) else {
            metrics::record_unmatched_response();
            tracing::debug!(correlation_id = id, error = %error, "Dropping failure with no pending call");
            return false;
        };

        metrics::record_pending_calls(self.calls.len());
        if call.slot.send(Err(error)).is_err() {
            tracing::debug!(correlation_id = id, url = %call.url, "Caller gave up before failure arrived");
        }
        true
    }

    /// Resolve every outstanding call with `ConnectionLost` and refuse new ones.
    ///
    /// Returns the number of calls failed.
    pub fn fail_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<CorrelationId> = self.calls.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, call)) = self.calls.remove(&id) {
                let _ = call.slot.send(Err(TransportError::ConnectionLost));
                failed += 1;
            }
        }
        metrics::record_pending_calls(0);
        failed
    }

    /// Remove a Pending Call without resolving it. Returns false if absent.
    pub fn abandon(&self, id: CorrelationId) -> bool {
        let removed = self.calls.remove(&id).is_some();
        if removed {
            tracing::debug!(correlation_id = id, "Pending call abandoned");
            metrics::record_pending_calls(self.calls.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Completion slot of one registered call.
pub struct PendingSlot<'a> {
    calls: &'a PendingCalls,
    id: CorrelationId,
    rx: oneshot::Receiver<TransportResult<Value>>,
}

impl PendingSlot<'_> {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Suspend until the call is resolved.
    pub async fn wait(mut self) -> TransportResult<Value> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionLost),
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.calls.abandon(self.id);
    }
}
