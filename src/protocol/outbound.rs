//! Outbound seam between envelope producers and the socket.

use crate::protocol::Envelope;

/// Anything that can accept an envelope for transmission.
///
/// `send` never blocks and never fails loudly: it returns `false` when the
/// envelope could not be queued (e.g. the socket is not open). Callers learn
/// about the consequences through disconnection handling, not through this
/// return value.
pub trait Outbound: Send + Sync {
    fn send(&self, envelope: Envelope) -> bool;
}
