//! Configuration for the Parley runtime.
//!
//! Layered loading via figment, the [`ParleyConfig`] schema and validation
//! performed before any bot is created.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ParleyConfig,
    SessionConfig, SpanEventConfig,
};
pub use validation::validate_config;
