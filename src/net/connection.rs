//! Duplex socket connection and its lifecycle state machine.
//!
//! # Responsibilities
//! - Own exactly one WebSocket to the server endpoint
//! - Track lifecycle state (Connecting → Open → Closed)
//! - Report every transition to lifecycle subscribers
//! - Fan inbound envelopes out to `messages()` subscribers in wire order
//! - Queue outbound envelopes without blocking the caller
//!
//! # Design Decisions
//! - Closed is terminal; reconnecting means opening a new Connection
//! - One task owns the socket, so reads and writes never race
//! - No retries here; the owner decides whether to reconnect

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::net::fanout::{Fanout, FanoutStream};
use crate::observability::metrics;
use crate::protocol::{Envelope, Outbound};

/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; envelopes flow both ways.
    Open,
    /// Connection is gone for good.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tunables for a single connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Stream of inbound envelopes for one subscriber.
pub type MessageStream = FanoutStream<Envelope>;

/// Stream of lifecycle transitions for one subscriber.
pub type LifecycleStream = FanoutStream<ConnectionState>;

/// A single long-lived duplex channel to one endpoint.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    endpoint: String,
    state: watch::Sender<ConnectionState>,
    /// Serializes transitions so lifecycle subscribers see them in order.
    transition_lock: Mutex<()>,
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Fanout<Envelope>,
    lifecycle: Fanout<ConnectionState>,
}

impl Connection {
    /// Start connecting to `endpoint`.
    ///
    /// Returns immediately in the `Connecting` state; the handshake runs on a
    /// background task. Must be called from within a Tokio runtime.
    pub fn open(endpoint: impl Into<String>, options: ConnectionOptions) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            endpoint: endpoint.into(),
            state,
            transition_lock: Mutex::new(()),
            outbound,
            inbound: Fanout::new(),
            lifecycle: Fanout::new(),
        });

        tracing::info!(
            connection_id = %connection.id,
            endpoint = %connection.endpoint,
            "Opening connection"
        );

        tokio::spawn(Arc::clone(&connection).drive(outbound_rx, options));
        connection
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Wait for the handshake to settle. Returns true if the connection is Open.
    pub async fn wait_open(&self) -> bool {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state == ConnectionState::Open);
        settled.unwrap_or(false)
    }

    /// Resolves once the connection is Closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await
            .map(|_| ());
    }

    /// Inbound envelopes received from now on, in wire order.
    ///
    /// The stream ends once the connection is closed and drained.
    pub fn messages(&self) -> MessageStream {
        self.inbound.subscribe()
    }

    /// Every lifecycle transition from now on. Ends after `Closed`.
    pub fn lifecycle(&self) -> LifecycleStream {
        self.lifecycle.subscribe()
    }

    /// Queue an envelope for transmission. Returns false if not Open.
    pub fn send(&self, envelope: Envelope) -> bool {
        if !self.is_open() {
            tracing::debug!(
                connection_id = %self.id,
                kind = envelope.kind(),
                state = %self.state(),
                "Dropping envelope, connection not open"
            );
            return false;
        }
        self.outbound.send(envelope).is_ok()
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        if self.transition(ConnectionState::Closed) {
            tracing::info!(connection_id = %self.id, "Connection closed by owner");
        }
    }

    /// Apply a state transition. Returns false if it was a no-op.
    fn transition(&self, next: ConnectionState) -> bool {
        let _guard = self.transition_lock.lock().expect("transition mutex poisoned");

        let changed = self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if !changed {
            return false;
        }

        tracing::debug!(connection_id = %self.id, state = %next, "Connection state changed");
        metrics::record_connection_state(next == ConnectionState::Open);

        if next == ConnectionState::Closed {
            self.inbound.close_with(None);
            self.lifecycle.close_with(Some(next));
        } else {
            self.lifecycle.publish(next);
        }
        true
    }

    /// Socket task: handshake, then pump frames both ways until closed.
    async fn drive(self: Arc<Self>, mut outbound_rx: mpsc::UnboundedReceiver<Envelope>, options: ConnectionOptions) {
        // Subscribed before any transition so a close() racing the handshake is never missed.
        let mut state_rx = self.state.subscribe();

        let handshake = tokio_tungstenite::connect_async(self.endpoint.as_str());
        let ws = match tokio::time::timeout(options.connect_timeout, handshake).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                tracing::warn!(connection_id = %self.id, error = %e, "Handshake failed");
                self.transition(ConnectionState::Closed);
                return;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %self.id,
                    timeout = ?options.connect_timeout,
                    "Handshake timed out"
                );
                self.transition(ConnectionState::Closed);
                return;
            }
        };

        let (mut sink, mut stream) = ws.split();

        if !self.transition(ConnectionState::Open) {
            // Closed by the owner while the handshake was in flight.
            let _ = sink.close().await;
            return;
        }
        tracing::info!(connection_id = %self.id, endpoint = %self.endpoint, "Connection open");

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(Envelope::decode(text.as_str())),
                    Some(Ok(Message::Binary(bytes))) => self.deliver(Envelope::decode_slice(&bytes)),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(connection_id = %self.id, "Server closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %self.id, error = %e, "Socket read failed");
                        break;
                    }
                },
                envelope = outbound_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let text = match envelope.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(connection_id = %self.id, error = %e, "Failed to encode envelope");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(connection_id = %self.id, error = %e, "Socket write failed");
                        break;
                    }
                },
                changed = state_rx.changed() => {
                    let closing = *state_rx.borrow() == ConnectionState::Closed;
                    if changed.is_err() || closing {
                        let _ = sink.close().await;
                        break;
                    }
                },
            }
        }

        self.transition(ConnectionState::Closed);
    }

    fn deliver(&self, decoded: Result<Envelope, crate::protocol::CodecError>) {
        match decoded {
            Ok(envelope) => self.inbound.publish(envelope),
            Err(e) => {
                metrics::record_protocol_error();
                tracing::warn!(connection_id = %self.id, error = %e, "Dropping undecodable frame");
            }
        }
    }
}

impl Outbound for Connection {
    fn send(&self, envelope: Envelope) -> bool {
        Connection::send(self, envelope)
    }
}
