//! Correlated request/response over the message-oriented connection.
//!
//! # Data Flow
//! ```text
//! call(method, path, body)
//!     → allocate correlation id (monotonic, starts at 1)
//!     → pending.rs registers the Pending Call
//!     → send Request envelope
//!     → suspend on the Pending Call's completion slot
//!
//! Inbound Response {id}
//!     → resolve(id): remove Pending Call, fire completion exactly once
//!     → unmatched id: logged and dropped
//!
//! Connection lost
//!     → fail_all(): every Pending Call resolves with ConnectionLost
//! ```
//!
//! # Design Decisions
//! - One bridge per connection; ids never outlive it
//! - Registration happens before the send, with no suspension in between
//! - No timeout or retry here; callers layer those on top

pub mod correlated;
pub mod pending;

pub use correlated::RequestBridge;
pub use pending::PendingCalls;
