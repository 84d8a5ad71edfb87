//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → selector swaps in the new [transport] section
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only [transport] is applied live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::EndpointConfig;
pub use schema::ObservabilityConfig;
pub use schema::ReconnectConfig;
pub use schema::TimeoutConfig;
pub use schema::TransportConfig;
