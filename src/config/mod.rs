//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (HAPROXY_* / CONSOLE_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ConsoleConfig (validated, immutable)
//!     → sections cloned into each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Environment wins over the file so credentials stay out of it
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ApiConfig;
pub use schema::ConsoleConfig;
pub use schema::DataplaneConfig;
pub use schema::MetricsFeedConfig;
pub use schema::ObservabilityConfig;
pub use schema::PollerConfig;
