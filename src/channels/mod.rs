//! Named event channels multiplexed over the shared connection.
//!
//! # Data Flow
//! ```text
//! subscribe(topic, handler)
//!     → first handler for topic? send Subscribe
//!     → register handler
//!
//! Inbound Event {topic, payload}
//!     → dispatch(topic, payload)
//!     → every active handler for topic, in arrival order
//!
//! unsubscribe(handle)
//!     → deactivate handler immediately
//!     → last handler for topic? send Unsubscribe
//! ```
//!
//! # Design Decisions
//! - Broadcast per topic, never competing consumers
//! - One Subscribe/Unsubscribe pair per topic regardless of handler count
//! - Registrations outlive a connection; attach() re-subscribes them

pub mod multiplexer;

pub use multiplexer::{ChannelMultiplexer, ChannelStream, Handler, SubscriptionHandle};
