//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Connection::open(endpoint)
//!     → connection.rs (handshake on a background task)
//!     → Connecting → Open → Closed, reported via lifecycle()
//!
//! Inbound frames
//!     → decoded Envelope
//!     → fanout.rs (one ordered queue per messages() subscriber)
//!
//! Outbound envelopes
//!     → Connection::send (non-blocking enqueue)
//!     → socket task writes the frame
//! ```
//!
//! # Design Decisions
//! - At most one active Connection per owner; reconnect = new Connection
//! - Closed is terminal and ends every inbound stream
//! - Sending while not Open is a logged no-op

pub mod connection;
pub mod fanout;

pub use connection::{
    Connection, ConnectionId, ConnectionOptions, ConnectionState, LifecycleStream, MessageStream,
};
pub use fanout::{Fanout, FanoutStream};
