//! Request/response calls tagged with correlation ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::bridge::pending::PendingCalls;
use crate::protocol::{CorrelationId, Envelope, Method, Outbound, RequestPayload, ResponsePayload};
use crate::transport::types::{TransportError, TransportResult};

/// Synchronous-looking calls over one connection.
///
/// Owns the correlation counter for that connection's lifetime; create a new
/// bridge for every new connection.
pub struct RequestBridge {
    outbound: Arc<dyn Outbound>,
    api_prefix: String,
    next_id: AtomicU64,
    pending: PendingCalls,
}

impl RequestBridge {
    pub fn new(outbound: Arc<dyn Outbound>, api_prefix: impl Into<String>) -> Self {
        Self {
            outbound,
            api_prefix: api_prefix.into(),
            next_id: AtomicU64::new(1),
            pending: PendingCalls::new(),
        }
    }

    /// Issue one request and wait for its matching response.
    ///
    /// Status < 400 resolves with the response body; >= 400 fails with
    /// [`TransportError::Api`]. Responses may arrive in any order.
    pub async fn call(&self, method: Method, path: &str, body: Option<Value>) -> TransportResult<Value> {
        let id = self.allocate_id();
        let url = format!("{}{}", self.api_prefix, path);

        let slot = self.pending.register(id, &url)?;

        tracing::debug!(correlation_id = id, method = %method, url = %url, "Sending request");
        let envelope = Envelope::Request {
            id,
            request: RequestPayload {
                method,
                url,
                entity: body,
            },
        };
        if !self.outbound.send(envelope) {
            tracing::debug!(correlation_id = id, "Request not sent, connection unavailable");
            return Err(TransportError::ConnectionLost);
        }

        slot.wait().await
    }

    /// Route an inbound Response to its caller. Returns false if unmatched.
    pub fn resolve(&self, id: CorrelationId, response: ResponsePayload) -> bool {
        self.pending.complete(id, response)
    }

    /// Fail one call whose Response body could not be decoded.
    pub fn reject(&self, id: CorrelationId, error: String) -> bool {
        tracing::warn!(correlation_id = id, error = %error, "Undecodable response body");
        self.pending.fail(id, TransportError::Decode(error))
    }

    /// Fail every pending call with `ConnectionLost`; later calls fail fast.
    pub fn fail_all(&self) -> usize {
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::warn!(failed, "Failed pending calls after connection loss");
        }
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    fn allocate_id(&self) -> CorrelationId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RequestBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBridge")
            .field("api_prefix", &self.api_prefix)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::outbound::testing::RecordingOutbound;
    use serde_json::json;
    use std::time::Duration;

    fn bridge() -> (Arc<RequestBridge>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::new());
        (Arc::new(RequestBridge::new(outbound.clone(), "")), outbound)
    }

    fn ok(entity: Value) -> ResponsePayload {
        ResponsePayload {
            status: 200,
            status_text: "OK".into(),
            entity,
        }
    }

    /// Let spawned calls run up to their suspension point.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let (bridge, outbound) = bridge();
        for _ in 0..3 {
            let b = bridge.clone();
            tokio::spawn(async move { b.call(Method::Get, "/x", None).await });
        }
        settle().await;

        let ids: Vec<_> = outbound
            .sent()
            .into_iter()
            .map(|e| match e {
                Envelope::Request { id, .. } => id,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_match_their_callers() {
        let (bridge, outbound) = bridge();
        let mut tasks = Vec::new();
        for n in 0..5 {
            let b = bridge.clone();
            tasks.push(tokio::spawn(async move {
                b.call(Method::Get, &format!("/item/{}", n), None).await
            }));
        }
        settle().await;

        // Answer in reverse, echoing each request's url.
        let mut sent = outbound.take();
        sent.reverse();
        for envelope in sent {
            if let Envelope::Request { id, request } = envelope {
                assert!(bridge.resolve(id, ok(json!(request.url))));
            }
        }

        for (n, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), json!(format!("/item/{}", n)));
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_body_and_prefix_are_sent() {
        let outbound = Arc::new(RecordingOutbound::new());
        let bridge = Arc::new(RequestBridge::new(outbound.clone(), "/api"));
        let b = bridge.clone();
        let task = tokio::spawn(async move { b.call(Method::Post, "/movies", Some(json!({"title": "x"}))).await });
        settle().await;

        let sent = outbound.sent();
        assert_eq!(
            sent,
            vec![Envelope::Request {
                id: 1,
                request: RequestPayload {
                    method: Method::Post,
                    url: "/api/movies".into(),
                    entity: Some(json!({"title": "x"})),
                },
            }]
        );
        bridge.resolve(1, ok(json!({"id": 1})));
        assert_eq!(task.await.unwrap().unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending_and_ignores_late_response() {
        let (bridge, _outbound) = bridge();
        let b = bridge.clone();
        let task = tokio::spawn(async move { b.call(Method::Get, "/api/movies", None).await });
        settle().await;
        assert_eq!(bridge.pending_count(), 1);

        assert_eq!(bridge.fail_all(), 1);
        assert!(matches!(task.await.unwrap(), Err(TransportError::ConnectionLost)));

        assert!(!bridge.resolve(1, ok(json!("late"))));
        assert!(matches!(
            bridge.call(Method::Get, "/again", None).await,
            Err(TransportError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_rejected_response_fails_only_its_call() {
        let (bridge, _outbound) = bridge();
        let first = tokio::spawn({
            let b = bridge.clone();
            async move { b.call(Method::Get, "/a", None).await }
        });
        let second = tokio::spawn({
            let b = bridge.clone();
            async move { b.call(Method::Get, "/b", None).await }
        });
        settle().await;

        assert!(bridge.reject(1, "invalid type: string \"500\"".into()));
        assert!(!bridge.reject(1, "duplicate".into()));
        assert!(bridge.resolve(2, ok(json!("b"))));

        let failed = first.await.unwrap().unwrap_err();
        assert!(matches!(failed, TransportError::Decode(_)));
        assert_eq!(second.await.unwrap().unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn test_unsent_request_fails_without_hanging() {
        let (bridge, outbound) = bridge();
        outbound.set_open(false);
        assert!(matches!(
            bridge.call(Method::Delete, "/api/movies/1", None).await,
            Err(TransportError::ConnectionLost)
        ));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_call_is_abandoned() {
        let (bridge, _outbound) = bridge();
        let result = tokio::time::timeout(Duration::from_millis(20), bridge.call(Method::Get, "/slow", None)).await;
        assert!(result.is_err());
        assert_eq!(bridge.pending_count(), 0);
        assert!(!bridge.resolve(1, ok(Value::Null)));
    }
}
