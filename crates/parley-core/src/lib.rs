//! # Parley Core
//!
//! Event dispatch and thread routing for chat bots.
//!
//! This layer provides:
//! - A closed [`Event`] model with raw session events and derived semantic events
//! - Typed [`Listener`]s and named [`Command`]s, validated when built
//! - [`Bot`]s that dispatch events to their listeners and derive messages,
//!   mentions, commands and reactions from raw events
//! - [`Plugin`]s bundling listeners and commands
//! - A [`BotManager`] and [`Fleet`] that route each event to the bots owning
//!   its thread
//! - [`Session`], [`Connector`] and [`Outbox`] seams for transports
//!
//! Loading configuration, logging and the event loop live in `parley-runtime`.

mod builtin;
mod pipeline;

pub mod bot;
pub mod command;
pub mod error;
pub mod event;
pub mod handler;
pub mod listener;
pub mod message;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod session;

pub use bot::{Bot, CORE_SOURCE, DispatchSettings, FaultPolicy};
pub use command::{Command, CommandBuilder, CommandDoc};
pub use error::{
    BoxError, DispatchError, DispatchResult, HandlerResult, RegistrationError, RegistrationResult,
    RoutingError, RoutingResult, SendError, SendResult, SessionError, SessionResult,
};
pub use event::{
    CommandEvent, EmojiMessage, Event, EventKind, EventVariant, ImageMessage, MentionEvent,
    MessageEnvelope, MessageEvent, OtherMessage, RawMessage, RawMessageReply, RawReaction,
    ReactionEvent, SessionNotice, StickerMessage, TextMessage, ThreadUpdate,
};
pub use handler::{Arity, BotRef, BoxFuture, Handler, IntoHandlerResult};
pub use listener::{Listener, ListenerBuilder};
pub use message::{
    Attachment, EmojiSize, ImageAttachment, Mention, MessageData, ReactionData, SessionNoticeKind,
    Sticker, ThreadAction,
};
pub use pipeline::COMMAND_PREFIX;
pub use plugin::{LoadedPlugin, Plugin, PluginSetup};
pub use registry::{Entry, Registry};
pub use router::{BotId, BotManager, Fleet, Router, ThreadMap};
pub use session::{
    Connector, MemoryOutbox, Outbox, ScriptedSession, SentMessage, Session, SessionHandle,
    SessionOrigin, ThreadRef,
};
