//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics → Selector + HttpFallback → Reconnect supervisor
//!
//! Shutdown (shutdown.rs):
//!     Signal received → supervisor stops → Connection closed → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - The socket is optional at startup; calls use the fallback until it opens
//! - Shutdown closes the Connection so pending socket calls fail, not hang

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{launch, Client};
