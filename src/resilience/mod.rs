//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call dispatched by the selector:
//!     → timeouts.rs (optional caller-level deadline around either transport)
//!
//! Connection lost:
//!     → backoff.rs (delay before the supervisor opens a new Connection)
//! ```
//!
//! # Design Decisions
//! - Deadlines live outside the bridge; an expired call abandons its Pending Call
//! - No automatic retry of calls; reconnect only restores the socket for later calls
//! - Jittered backoff keeps many clients from reconnecting in lockstep

pub mod backoff;
pub mod timeouts;
