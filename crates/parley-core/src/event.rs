//! Event model.
//!
//! [`Event`] is a closed enum. Raw variants are produced by the session;
//! derived variants are synthesized by the bot's built-in pipeline through
//! re-entrant dispatch. Each variant wraps its record in an `Arc`, so cloning
//! an event to hand it to several listeners or bots is cheap.
//!
//! - Raw: [`RawMessage`], [`RawMessageReply`], [`RawReaction`],
//!   [`ThreadUpdate`], [`SessionNotice`]
//! - Derived: [`MessageEvent`], [`TextMessage`], [`ImageMessage`],
//!   [`EmojiMessage`], [`StickerMessage`], [`OtherMessage`],
//!   [`MentionEvent`], [`CommandEvent`], [`ReactionEvent`]
//!
//! Dispatch is keyed on [`EventKind`], the fieldless tag of a variant. There is
//! no hierarchy: a listener for [`MessageEvent`] never sees a [`TextMessage`].
//!
//! # Typed access
//!
//! Every record type implements [`EventVariant`], which ties it to its tag and
//! knows how to pull its payload out of an [`Event`]. [`Event`] implements it
//! too, with no fixed tag, for listeners that want the whole enum.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::message::{
    EmojiSize, ImageAttachment, Mention, MessageData, ReactionData, SessionNoticeKind, Sticker,
    ThreadAction,
};
use crate::session::ThreadRef;

// =============================================================================
// Raw events
// =============================================================================

/// A message as received from the session.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub author: String,
    pub thread: ThreadRef,
    pub message: Arc<MessageData>,
    pub at: OffsetDateTime,
}

impl RawMessage {
    /// Creates a raw message timestamped with the message's creation time.
    pub fn new(author: impl Into<String>, thread: ThreadRef, message: MessageData) -> Self {
        let at = message.created_at;
        Self {
            author: author.into(),
            thread,
            message: Arc::new(message),
            at,
        }
    }
}

/// A reply to an earlier message.
#[derive(Debug, Clone)]
pub struct RawMessageReply {
    pub author: String,
    pub thread: ThreadRef,
    pub message: Arc<MessageData>,
    /// The message being replied to, when the session could resolve it.
    pub replied_to: Option<Arc<MessageData>>,
}

impl RawMessageReply {
    pub fn new(
        author: impl Into<String>,
        thread: ThreadRef,
        message: MessageData,
        replied_to: Option<MessageData>,
    ) -> Self {
        Self {
            author: author.into(),
            thread,
            message: Arc::new(message),
            replied_to: replied_to.map(Arc::new),
        }
    }

    /// Replies are timestamped by the reply message itself.
    pub fn at(&self) -> OffsetDateTime {
        self.message.created_at
    }
}

/// A reaction change as received from the session.
#[derive(Debug, Clone)]
pub struct RawReaction {
    pub author: String,
    pub thread: ThreadRef,
    pub reaction: ReactionData,
}

/// A participant changed something about a thread.
#[derive(Debug, Clone)]
pub struct ThreadUpdate {
    pub author: String,
    pub thread: ThreadRef,
    pub action: ThreadAction,
    pub at: OffsetDateTime,
}

/// The session's connection state changed.
#[derive(Debug, Clone)]
pub struct SessionNotice {
    pub notice: SessionNoticeKind,
    pub at: OffsetDateTime,
}

// =============================================================================
// Derived events
// =============================================================================

/// Fields shared by every message-derived event.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    pub author: String,
    pub thread: ThreadRef,
    pub message: Arc<MessageData>,
    pub at: OffsetDateTime,
    pub replied_to: Option<Arc<MessageData>>,
}

/// A message from someone other than the session user.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub envelope: MessageEnvelope,
}

/// A message with non-empty text.
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub envelope: MessageEnvelope,
    pub text: String,
}

/// A message carrying image attachments.
#[derive(Debug, Clone)]
pub struct ImageMessage {
    pub envelope: MessageEnvelope,
    pub images: Vec<ImageAttachment>,
}

/// A message consisting of a single emoji.
#[derive(Debug, Clone)]
pub struct EmojiMessage {
    pub envelope: MessageEnvelope,
    pub emoji: String,
    pub size: EmojiSize,
}

/// A sticker message.
#[derive(Debug, Clone)]
pub struct StickerMessage {
    pub envelope: MessageEnvelope,
    pub sticker: Sticker,
}

/// A message that fits no other category.
#[derive(Debug, Clone)]
pub struct OtherMessage {
    pub envelope: MessageEnvelope,
}

/// A text message that starts by mentioning the session user.
#[derive(Debug, Clone)]
pub struct MentionEvent {
    pub envelope: MessageEnvelope,
    pub mention: Mention,
}

/// A command invocation parsed from a message.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub envelope: MessageEnvelope,
    /// Command name, without prefix.
    pub name: String,
    /// Everything after the name, trimmed.
    pub body: String,
}

/// A reaction change, stamped with the time it was processed.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub author: String,
    pub thread: ThreadRef,
    pub reaction: ReactionData,
    pub observed_at: OffsetDateTime,
}

macro_rules! impl_envelope_deref {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Deref for $ty {
                type Target = MessageEnvelope;

                fn deref(&self) -> &MessageEnvelope {
                    &self.envelope
                }
            }
        )*
    };
}

impl_envelope_deref!(
    MessageEvent,
    TextMessage,
    ImageMessage,
    EmojiMessage,
    StickerMessage,
    OtherMessage,
    MentionEvent,
    CommandEvent,
);

// =============================================================================
// Event enum and tags
// =============================================================================

/// Typed access to one variant of [`Event`].
pub trait EventVariant: Send + Sync + 'static {
    /// The tag this type is dispatched under, or `None` for the untyped [`Event`].
    const KIND: Option<EventKind>;

    /// What a handler for this type receives.
    type Payload: Clone + Send + Sync + 'static;

    /// Extracts the payload if `event` is of this variant.
    fn extract(event: &Event) -> Option<Self::Payload>;
}

macro_rules! define_events {
    ($($variant:ident($ty:ty) => $name:literal),* $(,)?) => {
        /// A runtime event.
        #[derive(Debug, Clone)]
        pub enum Event {
            $($variant(Arc<$ty>),)*
        }

        /// The tag of an [`Event`] variant.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventKind {
            $($variant,)*
        }

        impl EventKind {
            /// Every tag, in declaration order.
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)*
                }
            }
        }

        impl Event {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Event::$variant(_) => EventKind::$variant,)*
                }
            }
        }

        $(
            impl EventVariant for $ty {
                const KIND: Option<EventKind> = Some(EventKind::$variant);
                type Payload = Arc<$ty>;

                fn extract(event: &Event) -> Option<Arc<$ty>> {
                    match event {
                        Event::$variant(inner) => Some(Arc::clone(inner)),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Event {
                fn from(value: $ty) -> Self {
                    Event::$variant(Arc::new(value))
                }
            }

            impl From<Arc<$ty>> for Event {
                fn from(value: Arc<$ty>) -> Self {
                    Event::$variant(value)
                }
            }
        )*
    };
}

define_events! {
    RawMessage(RawMessage) => "raw_message",
    RawMessageReply(RawMessageReply) => "raw_message_reply",
    RawReaction(RawReaction) => "raw_reaction",
    ThreadUpdate(ThreadUpdate) => "thread_update",
    SessionNotice(SessionNotice) => "session_notice",
    Message(MessageEvent) => "message",
    TextMessage(TextMessage) => "text_message",
    ImageMessage(ImageMessage) => "image_message",
    EmojiMessage(EmojiMessage) => "emoji_message",
    StickerMessage(StickerMessage) => "sticker_message",
    OtherMessage(OtherMessage) => "other_message",
    Mention(MentionEvent) => "mention",
    Command(CommandEvent) => "command",
    Reaction(ReactionEvent) => "reaction",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl EventVariant for Event {
    const KIND: Option<EventKind> = None;
    type Payload = Event;

    fn extract(event: &Event) -> Option<Event> {
        Some(event.clone())
    }
}

impl Event {
    /// Name of the variant, e.g. `"text_message"`.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The thread this event happened in, or `None` if it is not thread-scoped.
    pub fn thread(&self) -> Option<&ThreadRef> {
        match self {
            Event::RawMessage(e) => Some(&e.thread),
            Event::RawMessageReply(e) => Some(&e.thread),
            Event::RawReaction(e) => Some(&e.thread),
            Event::ThreadUpdate(e) => Some(&e.thread),
            Event::SessionNotice(_) => None,
            Event::Message(e) => Some(&e.thread),
            Event::TextMessage(e) => Some(&e.thread),
            Event::ImageMessage(e) => Some(&e.thread),
            Event::EmojiMessage(e) => Some(&e.thread),
            Event::StickerMessage(e) => Some(&e.thread),
            Event::OtherMessage(e) => Some(&e.thread),
            Event::Mention(e) => Some(&e.thread),
            Event::Command(e) => Some(&e.thread),
            Event::Reaction(e) => Some(&e.thread),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread().map(ThreadRef::id)
    }

    /// Returns the typed payload if this event is a `T`.
    pub fn downcast<T: EventVariant>(&self) -> Option<T::Payload> {
        T::extract(self)
    }
}
