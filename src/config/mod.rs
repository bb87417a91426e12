//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)             CLI flags
//!     → loader.rs (parse)            │
//!     → validation.rs ◀──────────────┘ (overrides applied, then validated)
//!     → ServerConfig (validated, immutable)
//!     → handed to lifecycle::serve
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new generation reads it afresh
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    HandoffConfig, ListenerConfig, LogFormat, LoggingConfig, MetricsConfig, Network,
    ServerConfig, ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};
