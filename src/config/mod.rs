//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (--port, --cors, --log-level)
//!     → ServerConfig (immutable once the server starts)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - No hot reload: the command registry is fixed at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{CorsConfig, FetchConfig, ListenerConfig, ObservabilityConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
