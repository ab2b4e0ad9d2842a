//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! bridgehead.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flag overrides (cli/commands.rs)
//!     → validation.rs (semantic checks)
//!     → ServerStateRecord written to the state file
//!     → read by every worker process
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts; changes need a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::BridgeConfig;
pub use schema::ListenerConfig;
pub use validation::{validate_config, ValidationError};
