//! Errors from loading and validating a [`ParleyConfig`](super::ParleyConfig).

use std::path::PathBuf;

use thiserror::Error;

/// Raised before any bot is created.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly given config file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// A source could not be parsed or extracted into the schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {message}")]
    Validation { message: String },

    /// A required value is absent or blank.
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Two bots share a name.
    #[error("Duplicate bot name: {0}")]
    DuplicateBotName(String),

    /// Two bots claim the same thread.
    #[error("Thread {thread} is claimed by both {first} and {second}")]
    DuplicateThread {
        thread: String,
        first: String,
        second: String,
    },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
