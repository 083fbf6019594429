//! # Parley
//!
//! Event dispatch and thread routing for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   raw event   ┌────────┐  recipients  ┌─────────────────────────────┐
//! │ Session │──────────────▶│ Router │─────────────▶│ Bot "greeter" (thread 123)  │
//! └─────────┘               └────────┘              │  raw → message → text       │
//!      ▲                                            │      → mention / command    │
//!      │            send_text                       │      → command handlers     │
//!      └────────────────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! - **Session**: a transport's event stream, behind the [`Session`](core::Session) trait
//! - **Router**: picks the bot owning the event's thread, or the fallback bot
//! - **Bot**: dispatches the event to its listeners; built-in listeners derive
//!   messages, mentions, commands and reactions and dispatch those in turn
//! - **Plugins**: bundles of listeners and commands loaded into a bot
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! async fn echo(cmd: Arc<CommandEvent>) -> SendResult<()> {
//!     cmd.thread.send_text(&cmd.body).await.map(drop)
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = ParleyRuntime::builder().build()?;
//!     let bot = runtime.manager_mut().add_bot("echo")?;
//!     bot.add_command(Command::new("echo").doc("Repeat the text").handler(echo).build()?, "main");
//!
//!     runtime.run(&my_connector).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_runtime as runtime;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use parley_runtime::{ParleyConfig, ParleyRuntime, RunStats};

    // Bots and routing
    pub use parley_core::{Bot, BotId, BotManager, BotRef, Fleet};

    // Handlers
    pub use parley_core::{Command, CommandDoc, Listener, Plugin, PluginSetup};

    // Events
    pub use parley_core::{
        CommandEvent, EmojiMessage, Event, EventKind, ImageMessage, MentionEvent, MessageEvent,
        OtherMessage, RawMessage, RawMessageReply, RawReaction, ReactionEvent, SessionNotice,
        StickerMessage, TextMessage, ThreadUpdate,
    };
    pub use parley_core::{MessageData, ReactionData, ThreadAction};

    // Transport seams
    pub use parley_core::{Connector, Outbox, Session, SessionHandle, SessionOrigin, ThreadRef};

    // Errors
    pub use parley_core::{BoxError, RegistrationResult, SendError, SendResult, SessionError};

    pub use parley_runtime::prelude::*;
}
