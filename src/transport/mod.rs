//! Transport selection subsystem.
//!
//! # Data Flow
//! ```text
//! get / post / put / delete
//!     → selector.rs decides the route once, at dispatch
//!         ├─ prefer_fallback set, or Connection not Open
//!         │     → fallback.rs (HTTP request/response)
//!         └─ otherwise
//!               → bridge (Request envelope, await matching Response)
//!     → types.rs outcome: body on < 400, ApiError on >= 400
//!
//! supervisor.rs:
//!     Connection closed → backoff → selector.connect() (fresh Connection + Bridge)
//! ```
//!
//! # Design Decisions
//! - Callers never learn which transport served a call
//! - Both transports surface failures with the same ApiError shape
//! - Recovery from transport loss happens on the next call, never mid-call

pub mod fallback;
pub mod selector;
pub mod supervisor;
pub mod types;

pub use fallback::{FallbackTransport, HttpFallback};
pub use selector::TransportSelector;
pub use supervisor::ReconnectSupervisor;
pub use types::{ApiError, Route, TransportError, TransportResult};
