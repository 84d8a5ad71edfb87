//! Per-call choice between the socket bridge and the fallback transport.
//!
//! # Responsibilities
//! - Offer one call interface regardless of transport
//! - Decide the route once per call, at dispatch time
//! - Own the current Connection, its Bridge and its dispatcher task
//! - Share the Channel Multiplexer across connections
//!
//! # Design Decisions
//! - Connecting counts as unavailable; calls never wait for a handshake
//! - A call never migrates between transports once dispatched
//! - Transport failures are not retried; the next call re-evaluates the route

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::bridge::RequestBridge;
use crate::channels::{ChannelMultiplexer, ChannelStream, SubscriptionHandle};
use crate::config::{ClientConfig, TransportConfig};
use crate::net::{Connection, ConnectionOptions, ConnectionState, MessageStream};
use crate::observability::metrics;
use crate::protocol::{Envelope, Method, Outbound};
use crate::resilience::timeouts::with_deadline;
use crate::transport::fallback::FallbackTransport;
use crate::transport::types::{Route, TransportResult};

/// The Connection currently owned by the selector, with its Bridge.
struct SocketLink {
    connection: Arc<Connection>,
    bridge: Arc<RequestBridge>,
}

impl Drop for SocketLink {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// Route chosen for one call.
enum Selected {
    Socket(Arc<RequestBridge>),
    Fallback,
}

impl Selected {
    fn route(&self) -> Route {
        match self {
            Selected::Socket(_) => Route::Socket,
            Selected::Fallback => Route::Fallback,
        }
    }
}

/// Uniform call interface over the socket bridge and a fallback client.
pub struct TransportSelector<F> {
    socket_url: String,
    api_prefix: String,
    connection_options: ConnectionOptions,
    request_timeout: Option<Duration>,
    transport: ArcSwap<TransportConfig>,
    fallback: F,
    channels: Arc<ChannelMultiplexer>,
    link: RwLock<Option<SocketLink>>,
}

impl<F: FallbackTransport> TransportSelector<F> {
    /// Build a selector. No connection is opened until [`connect`](Self::connect).
    pub fn new(config: &ClientConfig, fallback: F) -> Self {
        let request_timeout = match config.timeouts.request_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            socket_url: config.endpoint.socket_url.clone(),
            api_prefix: config.endpoint.api_prefix.clone(),
            connection_options: ConnectionOptions {
                connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            },
            request_timeout,
            transport: ArcSwap::from_pointee(config.transport.clone()),
            fallback,
            channels: Arc::new(ChannelMultiplexer::new()),
            link: RwLock::new(None),
        }
    }

    /// Open a brand-new Connection, replacing (and closing) any previous one.
    ///
    /// Correlation state never carries over: the new Connection gets a fresh
    /// Bridge. Channel subscriptions are re-sent once it is Open.
    pub fn connect(&self) -> Arc<Connection> {
        let connection = Connection::open(self.socket_url.clone(), self.connection_options.clone());
        let outbound: Arc<dyn Outbound> = connection.clone();
        let bridge = Arc::new(RequestBridge::new(outbound, self.api_prefix.clone()));

        // Subscribe before the handshake can complete so nothing is missed.
        let messages = connection.messages();
        tokio::spawn(dispatch(
            Arc::clone(&connection),
            Arc::clone(&bridge),
            Arc::clone(&self.channels),
            messages,
        ));

        let previous = self
            .link
            .write()
            .expect("socket link lock poisoned")
            .replace(SocketLink {
                connection: Arc::clone(&connection),
                bridge,
            });
        if let Some(previous) = previous {
            tracing::info!(connection_id = %previous.connection.id(), "Replacing connection");
        }

        connection
    }

    /// Close the current Connection, if any. Subscriptions are kept.
    pub fn close(&self) {
        let previous = self.link.write().expect("socket link lock poisoned").take();
        drop(previous);
    }

    /// The current Connection, if one has been opened.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.link
            .read()
            .expect("socket link lock poisoned")
            .as_ref()
            .map(|link| Arc::clone(&link.connection))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection()
            .map_or(ConnectionState::Closed, |connection| connection.state())
    }

    /// Route a call dispatched right now would take.
    pub fn route(&self) -> Route {
        self.select().route()
    }

    pub fn prefer_fallback(&self) -> bool {
        self.transport.load().prefer_fallback
    }

    /// Change the routing preference for calls dispatched from now on.
    pub fn set_prefer_fallback(&self, prefer_fallback: bool) {
        self.apply_transport_config(TransportConfig { prefer_fallback });
    }

    /// Swap in a reloaded `[transport]` section.
    pub fn apply_transport_config(&self, config: TransportConfig) {
        let previous = self.transport.swap(Arc::new(config));
        if previous.prefer_fallback != self.prefer_fallback() {
            tracing::info!(prefer_fallback = self.prefer_fallback(), "Transport preference changed");
        }
    }

    pub fn channels(&self) -> &Arc<ChannelMultiplexer> {
        &self.channels
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    pub async fn get(&self, path: &str) -> TransportResult<Value> {
        self.request(Method::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TransportResult<Value> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TransportResult<Value> {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TransportResult<Value> {
        self.request(Method::Delete, path, None).await
    }

    /// Issue one call over whichever transport is appropriate right now.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> TransportResult<Value> {
        let selected = self.select();
        let route = selected.route();
        let started = Instant::now();

        tracing::debug!(route = %route, method = %method, path = %path, "Dispatching call");

        let call = async move {
            match selected {
                Selected::Socket(bridge) => bridge.call(method, path, body).await,
                Selected::Fallback => self.fallback.request(method, path, body).await,
            }
        };
        let result = with_deadline(self.request_timeout, call).await;

        metrics::record_call(route, &result, started);
        if let Err(e) = &result {
            tracing::debug!(route = %route, method = %method, path = %path, error = %e, "Call failed");
        }
        result
    }

    pub fn subscribe<H>(&self, topic: impl Into<String>, handler: H) -> SubscriptionHandle
    where
        H: Fn(&Value) + Send + Sync + 'static,
    {
        self.channels.subscribe(topic, handler)
    }

    pub fn subscribe_stream(&self, topic: impl Into<String>) -> (SubscriptionHandle, ChannelStream) {
        self.channels.subscribe_stream(topic)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.channels.unsubscribe(handle)
    }

    /// The routing decision, taken once under the link lock.
    fn select(&self) -> Selected {
        if self.prefer_fallback() {
            return Selected::Fallback;
        }
        let link = self.link.read().expect("socket link lock poisoned");
        match link.as_ref() {
            Some(link) if link.connection.is_open() => Selected::Socket(Arc::clone(&link.bridge)),
            _ => Selected::Fallback,
        }
    }
}

impl<F> std::fmt::Debug for TransportSelector<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSelector")
            .field("socket_url", &self.socket_url)
            .field("prefer_fallback", &self.transport.load().prefer_fallback)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Per-connection dispatcher: routes inbound envelopes in arrival order.
async fn dispatch(
    connection: Arc<Connection>,
    bridge: Arc<RequestBridge>,
    channels: Arc<ChannelMultiplexer>,
    mut messages: MessageStream,
) {
    let key = connection.id().as_u64();
    if connection.wait_open().await {
        let outbound: Arc<dyn Outbound> = connection.clone();
        channels.attach(key, outbound);
    }

    while let Some(envelope) = messages.recv().await {
        match envelope {
            Envelope::Response { id, response } => {
                bridge.resolve(id, response);
            }
            Envelope::MalformedResponse { id, error } => {
                metrics::record_protocol_error();
                bridge.reject(id, error);
            }
            Envelope::Event { topic, payload } => {
                channels.dispatch(&topic, &payload);
            }
            other @ (Envelope::Subscribe { .. } | Envelope::Unsubscribe { .. } | Envelope::Request { .. }) => {
                metrics::record_protocol_error();
                tracing::warn!(
                    connection_id = %connection.id(),
                    kind = other.kind(),
                    "Ignoring client-only envelope from server"
                );
            }
        }
    }

    channels.detach(key);
    bridge.fail_all();
    tracing::debug!(connection_id = %connection.id(), "Dispatcher stopped");
}
