//! Unified error types for the Parley core.
//!
//! Registration and routing errors are configuration mistakes and surface
//! before the event loop starts. Dispatch errors surface while an event is
//! being handled and, under the default [`FaultPolicy`](crate::FaultPolicy),
//! end the loop.

use thiserror::Error;

use crate::event::EventKind;
use crate::router::BotId;

/// Boxed error returned by listener and command handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type produced by every erased handler.
pub type HandlerResult = Result<(), BoxError>;

// =============================================================================
// Registration Errors
// =============================================================================

/// Errors raised while building or registering listeners, commands and plugins.
///
/// All of these are fatal at setup time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A listener was built without a handler, i.e. nothing would receive the event.
    #[error("listener has no handler; it must accept at least the event it responds to")]
    MissingHandler,

    /// The explicit variant tag disagrees with the handler's event type.
    #[error("listener declared for '{declared}' but its handler accepts '{inferred}'")]
    KindMismatch {
        /// Variant passed to `.kind(..)`.
        declared: EventKind,
        /// Variant implied by the handler's parameter type.
        inferred: EventKind,
    },

    /// An untyped listener was built without an explicit variant tag.
    #[error("listener has no event variant; declare one with `.kind(..)` or use a typed listener")]
    UnresolvedKind,

    /// A command was built with an empty name.
    #[error("command name must not be empty")]
    EmptyCommandName,

    /// A command was built without a handler.
    #[error("command '{0}' has no handler")]
    MissingCommandHandler(String),

    /// A plugin's load hook failed.
    #[error("plugin '{plugin}' failed to load: {reason}")]
    PluginLoad {
        /// Name of the plugin.
        plugin: String,
        /// Display form of the hook's error.
        reason: String,
    },
}

// =============================================================================
// Routing Errors
// =============================================================================

/// Errors raised by thread assignment and fleet start-up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The thread already belongs to another bot.
    #[error("thread '{thread}' is already assigned to bot '{owner}', cannot assign it to '{requested}'")]
    ThreadConflict {
        /// Thread identifier.
        thread: String,
        /// Name of the current owner.
        owner: String,
        /// Name of the bot that asked for the thread.
        requested: String,
    },

    /// More than one bot has no thread, so the fallback is ambiguous.
    #[error("cannot have more than one bot assigned to no threads (unassigned: {})", bots.join(", "))]
    AmbiguousFallback {
        /// Names of every unassigned bot.
        bots: Vec<String>,
    },

    /// A bot id does not belong to this manager.
    #[error("unknown bot {0}")]
    UnknownBot(BotId),
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors raised while dispatching an event through a bot.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener returned an error.
    #[error("listener from '{origin}' failed on {kind}: {error}")]
    Listener {
        /// Variant being dispatched.
        kind: EventKind,
        /// Source label of the failing listener.
        origin: String,
        /// The handler's error.
        #[source]
        error: BoxError,
    },

    /// A command handler returned an error.
    #[error("command '{name}' from '{origin}' failed: {error}")]
    Command {
        /// Command name.
        name: String,
        /// Source label of the failing command.
        origin: String,
        /// The handler's error.
        #[source]
        error: BoxError,
    },

    /// Re-entrant dispatch went deeper than the configured maximum.
    #[error("dispatch depth exceeded {max_depth} while dispatching {kind}; check for cyclic derivations")]
    DepthExceeded {
        /// Variant that would have exceeded the limit.
        kind: EventKind,
        /// Configured maximum depth.
        max_depth: usize,
    },
}

impl DispatchError {
    /// Wraps a listener failure, passing nested dispatch errors through unchanged.
    pub(crate) fn from_listener(kind: EventKind, origin: &str, error: BoxError) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(error) => Self::Listener {
                kind,
                origin: origin.to_string(),
                error,
            },
        }
    }

    /// Wraps a command failure, passing nested dispatch errors through unchanged.
    pub(crate) fn from_command(name: &str, origin: &str, error: BoxError) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(error) => Self::Command {
                name: name.to_string(),
                origin: origin.to_string(),
                error,
            },
        }
    }
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors from the outbound side of a session.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The transport refused or failed to deliver the message.
    #[error("failed to send to thread '{thread}': {reason}")]
    Failed {
        /// Target thread.
        thread: String,
        /// Transport-provided reason.
        reason: String,
    },

    /// The session is no longer connected.
    #[error("session is closed")]
    Closed,
}

/// Errors from the inbound side of a session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Logging in, or restoring saved credentials, failed.
    #[error("login failed: {0}")]
    Login(String),

    /// The event stream broke.
    #[error("event stream failed: {0}")]
    Stream(String),

    /// An incoming event could not be decoded.
    #[error("failed to decode event: {0}")]
    Decode(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Result type for routing.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Result type for dispatch.
pub type DispatchResult<T = ()> = Result<T, DispatchError>;

/// Result type for outbound sends.
pub type SendResult<T> = Result<T, SendError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
