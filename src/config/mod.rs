//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → AuthzConfig (validated, immutable)
//!     → handed to DecisionEngine and HttpServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the failure mode is fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Environment variables override file values
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthzConfig, BreakerConfig, CacheBackend, CacheConfig, ListenerConfig, ObservabilityConfig, VerdictConfig,
};
pub use validation::ValidationError;
