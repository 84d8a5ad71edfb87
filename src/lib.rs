//! Socket transport for the media library client.
//!
//! Request/response calls and server-push events share one WebSocket, with
//! a plain HTTP fallback whenever the socket is unavailable or not preferred.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod resilience;
pub mod transport;

pub use channels::{ChannelMultiplexer, SubscriptionHandle};
pub use config::ClientConfig;
pub use lifecycle::Shutdown;
pub use net::{Connection, ConnectionState};
pub use protocol::{Envelope, Method};
pub use transport::{FallbackTransport, HttpFallback, TransportError, TransportResult, TransportSelector};
