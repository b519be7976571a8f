//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RuntimeConfig (validated, immutable)
//!     → handed by reference to each component at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes take effect on the next restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ConnectionConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RuntimeConfig;
pub use schema::TickConfig;
pub use schema::TransferConfig;
