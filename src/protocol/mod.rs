//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     channels / bridge build an Envelope
//!     → Outbound::send (Connection queues it)
//!     → envelope.rs encodes {method, id, entity} JSON text frame
//!
//! Inbound:
//!     text/binary frame
//!     → envelope.rs decodes into the Envelope sum type
//!     → dispatcher matches exhaustively on the variant
//! ```
//!
//! # Design Decisions
//! - The `method` string is interpreted exactly once, at decode time
//! - Any unknown `method` on the wire is a server-push Event for that topic
//! - Subscribe/Unsubscribe carry id 0; Request/Response carry the correlation id

pub mod envelope;
pub mod outbound;

pub use envelope::{CodecError, CorrelationId, Envelope, Method, RequestPayload, ResponsePayload};
pub use outbound::Outbound;
