//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use parley_core::DispatchSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    /// Settings shared by every bot that does not override them.
    #[serde(default)]
    pub settings: Map<String, Value>,

    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatch behaviour applied to every bot.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Session persistence.
    #[serde(default)]
    pub session: SessionConfig,

    /// Bots to create at startup, in order.
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

impl ParleyConfig {
    /// Shared settings as a JSON value.
    pub fn shared_settings(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}

// =============================================================================
// Bots
// =============================================================================

/// A bot created from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    pub name: String,

    /// Threads claimed by this bot. A bot without threads is the fallback.
    #[serde(default)]
    pub threads: Vec<String>,

    /// Keys overriding the shared settings for this bot only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl BotConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threads: Vec::new(),
            settings: None,
        }
    }

    pub fn thread(mut self, thread: impl Into<String>) -> Self {
        self.threads.push(thread.into());
        self
    }

    /// Shared settings with this bot's overrides applied on top.
    pub fn effective_settings(&self, shared: &Map<String, Value>) -> Value {
        let mut merged = shared.clone();
        if let Some(overrides) = &self.settings {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Where and whether session credentials are kept between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_file")]
    pub file: PathBuf,

    /// Load saved credentials at start and save them at shutdown.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
            persist: true,
        }
    }
}

fn default_session_file() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-target levels, e.g. `parley_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the log call site.
    #[serde(default)]
    pub file_location: bool,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}
