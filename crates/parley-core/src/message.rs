//! Message payloads carried by events.
//!
//! These are plain data records as delivered by the session. They are shared
//! between events through `Arc` and never mutated after construction.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A mention span inside a message's text.
///
/// `offset` and `length` count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// User id being mentioned.
    pub target_id: String,
    /// Character offset of the span.
    pub offset: usize,
    /// Character length of the span.
    pub length: usize,
}

impl Mention {
    pub fn new(target_id: impl Into<String>, offset: usize, length: usize) -> Self {
        Self {
            target_id: target_id.into(),
            offset,
            length,
        }
    }
}

/// A sticker sent as a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// An image attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Image(ImageAttachment),
    Audio { id: String },
    Video { id: String },
    File { id: String, name: String },
}

impl Attachment {
    /// Returns the image if this attachment is one.
    pub fn as_image(&self) -> Option<&ImageAttachment> {
        match self {
            Attachment::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Display size of an emoji sent on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmojiSize {
    Small,
    Medium,
    Large,
}

/// A message as delivered by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<Mention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Sticker>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji_size: Option<EmojiSize>,
    #[serde(with = "time::serde::timestamp", default = "OffsetDateTime::now_utc")]
    pub created_at: OffsetDateTime,
}

impl MessageData {
    /// Creates an empty message stamped with the current time.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
            mentions: Vec::new(),
            sticker: None,
            attachments: Vec::new(),
            emoji_size: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_mention(mut self, mention: Mention) -> Self {
        self.mentions.push(mention);
        self
    }

    pub fn with_sticker(mut self, sticker: Sticker) -> Self {
        self.sticker = Some(sticker);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = created_at;
        self
    }

    /// Text of the message, or `""` when it has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Iterates over image attachments.
    pub fn images(&self) -> impl Iterator<Item = &ImageAttachment> {
        self.attachments.iter().filter_map(Attachment::as_image)
    }
}

/// A reaction added to, or removed from, a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionData {
    pub message_id: String,
    /// `None` when the reaction was removed.
    #[serde(default)]
    pub reaction: Option<String>,
}

/// A change made to a thread by one of its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ThreadAction {
    TitleSet { title: String },
    ParticipantsAdded { added: Vec<String> },
    ParticipantRemoved { removed: String },
    NicknameSet { subject: String, nickname: Option<String> },
    EmojiSet { emoji: String },
}

/// A change in the session's connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionNoticeKind {
    Connected,
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
}
