//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, string tags → typed values)
//!     → DdnsConfig (validated, immutable)
//!     → captured by the start hooks that need it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - An unrecognized session backend is fatal before any hook runs

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, parse_config, ConfigError};
pub use schema::{
    DdnsConfig, LifecycleConfig, ObservabilityConfig, RedisConfig, ServerConfig, SessionConfig,
    WebConfig,
};
pub use validation::{validate_config, ValidationError};
