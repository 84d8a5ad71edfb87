//! Topic subscription table and event dispatch.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::protocol::{Envelope, Outbound};

/// Callback invoked with the payload of every matching Event.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Returned by `subscribe`; pass it to `unsubscribe` to cancel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    topic: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct HandlerEntry {
    id: u64,
    /// Cancellation token, cleared by `unsubscribe` before the entry is removed.
    active: AtomicBool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, Vec<Arc<HandlerEntry>>>,
    /// Connection currently carrying subscriptions, keyed by connection id.
    outbound: Option<(u64, Arc<dyn Outbound>)>,
}

impl Registry {
    fn send(&self, envelope: Envelope) {
        if let Some((key, outbound)) = &self.outbound {
            let kind = envelope.kind();
            if !outbound.send(envelope) {
                tracing::debug!(connection = key, kind, "Subscription envelope not sent");
            }
        }
    }
}

/// Shares one inbound event stream among many named subscriptions.
pub struct ChannelMultiplexer {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl ChannelMultiplexer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register `handler` for every Event on `topic`.
    ///
    /// The first active subscription for a topic sends `Subscribe` before the
    /// handler becomes visible to dispatch.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(HandlerEntry {
            id,
            active: AtomicBool::new(true),
            handler: Arc::new(handler),
        });

        let mut registry = self.registry.lock().expect("channel registry mutex poisoned");
        let first = registry.topics.get(&topic).map_or(true, |entries| entries.is_empty());
        if first {
            registry.send(Envelope::Subscribe { topic: topic.clone() });
        }
        registry.topics.entry(topic.clone()).or_default().push(entry);
        drop(registry);

        tracing::debug!(topic = %topic, subscription = id, first, "Subscribed");
        SubscriptionHandle { id, topic }
    }

    /// Like `subscribe`, but delivers payloads into a stream.
    pub fn subscribe_stream(&self, topic: impl Into<String>) -> (SubscriptionHandle, ChannelStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(topic, move |payload: &Value| {
            let _ = tx.send(payload.clone());
        });
        (handle, ChannelStream { rx })
    }

    /// Cancel a subscription. Returns false if it was already cancelled.
    ///
    /// The handler is deactivated before this returns, so it will not be
    /// invoked for any event not yet handed to it, even one mid-dispatch.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut registry = self.registry.lock().expect("channel registry mutex poisoned");
        let Some(entries) = registry.topics.get_mut(&handle.topic) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|entry| entry.id == handle.id) else {
            return false;
        };

        let entry = entries.remove(pos);
        entry.active.store(false, Ordering::SeqCst);

        let last = entries.is_empty();
        if last {
            registry.topics.remove(&handle.topic);
            registry.send(Envelope::Unsubscribe {
                topic: handle.topic.clone(),
            });
        }
        drop(registry);

        tracing::debug!(topic = %handle.topic, subscription = handle.id, last, "Unsubscribed");
        true
    }

    /// Deliver one Event payload to every active handler for `topic`.
    ///
    /// Returns the number of handlers that ran to completion.
    pub fn dispatch(&self, topic: &str, payload: &Value) -> usize {
        let snapshot: Vec<Arc<HandlerEntry>> = {
            let registry = self.registry.lock().expect("channel registry mutex poisoned");
            match registry.topics.get(topic) {
                Some(entries) => entries.clone(),
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            tracing::debug!(topic = %topic, "Event for topic with no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (entry.handler)(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    metrics::record_handler_panic();
                    tracing::warn!(topic = %topic, subscription = entry.id, "Event handler panicked");
                }
            }
        }
        delivered
    }

    /// Bind to a freshly opened connection and re-subscribe every live topic.
    ///
    /// Returns the number of topics re-subscribed.
    pub fn attach(&self, key: u64, outbound: Arc<dyn Outbound>) -> usize {
        let mut registry = self.registry.lock().expect("channel registry mutex poisoned");
        registry.outbound = Some((key, outbound));

        let topics: Vec<String> = registry
            .topics
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in &topics {
            registry.send(Envelope::Subscribe { topic: topic.clone() });
        }
        drop(registry);

        if !topics.is_empty() {
            tracing::info!(connection = key, topics = topics.len(), "Re-subscribed topics");
        }
        topics.len()
    }

    /// Forget the connection identified by `key`, if it is the attached one.
    pub fn detach(&self, key: u64) {
        let mut registry = self.registry.lock().expect("channel registry mutex poisoned");
        if matches!(&registry.outbound, Some((current, _)) if *current == key) {
            registry.outbound = None;
            tracing::debug!(connection = key, "Channels detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.registry
            .lock()
            .expect("channel registry mutex poisoned")
            .outbound
            .is_some()
    }

    /// Topics with at least one active subscription.
    pub fn topics(&self) -> Vec<String> {
        let registry = self.registry.lock().expect("channel registry mutex poisoned");
        let mut topics: Vec<String> = registry.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .lock()
            .expect("channel registry mutex poisoned")
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl Default for ChannelMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChannelMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMultiplexer")
            .field("topics", &self.topics())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Event payloads for one subscription, as a stream.
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl ChannelStream {
    /// Next payload, or `None` once the subscription is cancelled and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ChannelStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}
