//! A session that reads events from stdin and prints replies to stdout.
//!
//! Each input line is either plain text, treated as a message from `you` in
//! the `console` thread, or a JSON object:
//!
//! ```text
//! {"type":"message","author":"alice","thread":"123","text":".ping"}
//! {"type":"message","author":"alice","thread":"123","text":"@bot echo hi","mentions":[{"target_id":"bot","offset":0,"length":4}]}
//! {"type":"message","author":"alice","thread":"123","text":"agreed","reply_to":"console-1"}
//! {"type":"reaction","author":"alice","thread":"123","message_id":"console-1","reaction":"+1"}
//! {"type":"update","author":"alice","thread":"123","action":{"action":"title_set","title":"Lunch"}}
//! {"type":"notice","notice":{"state":"disconnected","reason":"bye"}}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parley::core::{
    Connector, Event, Mention, MessageData, Outbox, RawMessage, RawMessageReply, RawReaction,
    ReactionData, SendResult, Session, SessionError, SessionHandle, SessionNotice,
    SessionNoticeKind, SessionOrigin, SessionResult, ThreadAction, ThreadUpdate,
};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// Author of plain-text lines.
pub const CONSOLE_AUTHOR: &str = "you";
/// Thread of plain-text lines.
pub const CONSOLE_THREAD: &str = "console";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputLine {
    Message {
        author: String,
        thread: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        mentions: Vec<Mention>,
        #[serde(default)]
        reply_to: Option<String>,
    },
    Reaction {
        author: String,
        thread: String,
        message_id: String,
        #[serde(default)]
        reaction: Option<String>,
    },
    Update {
        author: String,
        thread: String,
        action: ThreadAction,
    },
    Notice {
        notice: SessionNoticeKind,
    },
}

// =============================================================================
// Session
// =============================================================================

/// Turns input lines into raw events.
pub struct ConsoleSession<R> {
    handle: SessionHandle,
    lines: Lines<R>,
    next_id: AtomicUsize,
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleSession<R> {
    pub fn new(handle: SessionHandle, reader: R) -> Self {
        Self {
            handle,
            lines: reader.lines(),
            next_id: AtomicUsize::new(1),
        }
    }

    fn message_id(&self) -> String {
        format!("console-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Parses one input line. Blank lines yield nothing.
    fn parse_line(&self, line: &str) -> serde_json::Result<Option<Event>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('{') {
            let data = MessageData::new(self.message_id()).with_text(line);
            let thread = self.handle.thread(CONSOLE_THREAD);
            return Ok(Some(RawMessage::new(CONSOLE_AUTHOR, thread, data).into()));
        }

        let event = match serde_json::from_str(line)? {
            InputLine::Message {
                author,
                thread,
                text,
                mentions,
                reply_to,
            } => {
                let mut data = MessageData::new(self.message_id()).with_text(text);
                for mention in mentions {
                    data = data.with_mention(mention);
                }
                let thread = self.handle.thread(thread);
                match reply_to {
                    Some(id) => {
                        RawMessageReply::new(author, thread, data, Some(MessageData::new(id)))
                            .into()
                    }
                    None => RawMessage::new(author, thread, data).into(),
                }
            }
            InputLine::Reaction {
                author,
                thread,
                message_id,
                reaction,
            } => RawReaction {
                author,
                thread: self.handle.thread(thread),
                reaction: ReactionData {
                    message_id,
                    reaction,
                },
            }
            .into(),
            InputLine::Update {
                author,
                thread,
                action,
            } => ThreadUpdate {
                author,
                thread: self.handle.thread(thread),
                action,
                at: OffsetDateTime::now_utc(),
            }
            .into(),
            InputLine::Notice { notice } => SessionNotice {
                notice,
                at: OffsetDateTime::now_utc(),
            }
            .into(),
        };
        Ok(Some(event))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Session for ConsoleSession<R> {
    fn user_id(&self) -> &str {
        self.handle.user_id()
    }

    async fn next_event(&mut self) -> SessionResult<Option<Event>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| SessionError::Stream(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            match self.parse_line(&line) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, line = %line, "Skipping unreadable input line"),
            }
        }
    }

    fn credentials(&self) -> Option<Value> {
        Some(json!({ "user_id": self.handle.user_id() }))
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// Prints sent messages to stdout.
#[derive(Debug, Default)]
pub struct ConsoleOutbox {
    sent: AtomicUsize,
}

#[async_trait]
impl Outbox for ConsoleOutbox {
    async fn send_text(&self, thread_id: &str, text: &str) -> SendResult<String> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{thread_id}] {text}");
        Ok(format!("reply-{n}"))
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens a [`ConsoleSession`] on stdin.
///
/// Saved credentials are accepted only when they belong to the same user.
pub struct ConsoleConnector {
    user_id: String,
    outbox: Arc<dyn Outbox>,
}

impl ConsoleConnector {
    pub fn new(user_id: impl Into<String>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            user_id: user_id.into(),
            outbox,
        }
    }

    fn origin(&self, saved: Option<&Value>) -> SessionOrigin {
        let saved_user = saved
            .and_then(|credentials| credentials.get("user_id"))
            .and_then(Value::as_str);
        match saved_user {
            Some(user) if user == self.user_id => SessionOrigin::Restored,
            _ => SessionOrigin::Created,
        }
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    async fn connect(
        &self,
        saved: Option<Value>,
    ) -> SessionResult<(Box<dyn Session>, SessionOrigin)> {
        let origin = self.origin(saved.as_ref());
        let handle = SessionHandle::new(self.user_id.as_str(), Arc::clone(&self.outbox));
        let session = ConsoleSession::new(handle, BufReader::new(tokio::io::stdin()));
        Ok((Box::new(session), origin))
    }
}
