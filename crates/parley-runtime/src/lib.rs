//! Parley Runtime - configuration, logging and the event loop.
//!
//! This crate provides:
//! - Layered configuration loading and validation ([`ConfigLoader`], [`ParleyConfig`])
//! - Logging setup over `tracing-subscriber` ([`LoggingBuilder`])
//! - Session credential persistence ([`SessionStore`], [`JsonFileStore`])
//! - The runtime that builds bots from configuration and drives them
//!   ([`ParleyRuntime`])
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = ParleyRuntime::builder().build()?;
//!     runtime
//!         .bot_mut("main")
//!         .context("bot `main` is not configured")?
//!         .load_plugin(Arc::new(MyPlugin))?;
//!
//!     runtime.run(&MyConnector::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod store;

pub use config::{BotConfig, ConfigError, ConfigLoader, ConfigResult, ParleyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{FmtSpan, LoggingBuilder};
pub use runtime::{ParleyRuntime, RunStats, RuntimeBuilder, wait_for_shutdown};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError, StoreResult};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
