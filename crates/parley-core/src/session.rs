//! Session seams: the inbound event stream and the outbound message sink.
//!
//! Parley does not speak any chat protocol itself. A transport implements
//! [`Session`] to yield raw [`Event`]s and [`Outbox`] to deliver replies; a
//! [`Connector`] logs in, optionally restoring previously saved credentials.
//!
//! Every thread-scoped event carries a [`ThreadRef`], which bundles the thread
//! id with a [`SessionHandle`] so handlers can reply without any other
//! context:
//!
//! ```rust,ignore
//! async fn echo(event: Arc<TextMessage>) -> SendResult<()> {
//!     event.thread.send_text(&event.text).await.map(drop)
//! }
//! ```
//!
//! [`MemoryOutbox`] and [`ScriptedSession`] are in-memory implementations for
//! tests and local tooling.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SendResult, SessionResult};
use crate::event::Event;

// =============================================================================
// Outbound
// =============================================================================

/// Delivers outgoing text to a thread.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Sends `text` to `thread_id`, returning the id of the sent message.
    async fn send_text(&self, thread_id: &str, text: &str) -> SendResult<String>;
}

/// The logged-in user and the way to talk back.
#[derive(Clone)]
pub struct SessionHandle {
    user_id: Arc<str>,
    outbox: Arc<dyn Outbox>,
}

impl SessionHandle {
    pub fn new(user_id: impl Into<Arc<str>>, outbox: Arc<dyn Outbox>) -> Self {
        Self {
            user_id: user_id.into(),
            outbox,
        }
    }

    /// Id of the account the session is logged in as.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn outbox(&self) -> &Arc<dyn Outbox> {
        &self.outbox
    }

    /// Returns a reference to `thread_id` within this session.
    pub fn thread(&self, thread_id: impl Into<Arc<str>>) -> ThreadRef {
        ThreadRef {
            id: thread_id.into(),
            session: self.clone(),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// A conversation thread within a session.
#[derive(Clone)]
pub struct ThreadRef {
    id: Arc<str>,
    session: SessionHandle,
}

impl ThreadRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Sends a text message to this thread.
    pub async fn send_text(&self, text: &str) -> SendResult<String> {
        self.session.outbox.send_text(&self.id, text).await
    }
}

impl fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRef")
            .field("id", &self.id)
            .field("user_id", &self.session.user_id)
            .finish()
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// A logged-in event stream.
#[async_trait]
pub trait Session: Send {
    /// Id of the account this session is logged in as.
    fn user_id(&self) -> &str;

    /// Waits for the next raw event. `Ok(None)` means the stream has ended.
    async fn next_event(&mut self) -> SessionResult<Option<Event>>;

    /// Credentials to persist so the next start can skip logging in.
    fn credentials(&self) -> Option<Value> {
        None
    }
}

/// How a session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Saved credentials were accepted.
    Restored,
    /// A fresh login was performed.
    Created,
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Logs in, trying `saved` credentials first when present.
    async fn connect(&self, saved: Option<Value>)
    -> SessionResult<(Box<dyn Session>, SessionOrigin)>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// A message recorded by [`MemoryOutbox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub thread_id: String,
    pub text: String,
}

/// An [`Outbox`] that records everything sent through it.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<SentMessage>>,
}

impl MemoryOutbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of every message sent so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Removes and returns every message sent so far.
    pub fn take(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl Outbox for MemoryOutbox {
    async fn send_text(&self, thread_id: &str, text: &str) -> SendResult<String> {
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            thread_id: thread_id.to_string(),
            text: text.to_string(),
        });
        Ok(format!("sent-{}", sent.len()))
    }
}

/// A [`Session`] that replays a fixed list of events and then ends.
#[derive(Debug)]
pub struct ScriptedSession {
    user_id: String,
    events: VecDeque<Event>,
    credentials: Option<Value>,
}

impl ScriptedSession {
    pub fn new(user_id: impl Into<String>, events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            user_id: user_id.into(),
            events: events.into_iter().collect(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Value) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Number of events not yet pulled.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn next_event(&mut self) -> SessionResult<Option<Event>> {
        Ok(self.events.pop_front())
    }

    fn credentials(&self) -> Option<Value> {
        self.credentials.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_thread_send_goes_through_outbox() {
        let outbox = MemoryOutbox::new();
        let session = SessionHandle::new("me", outbox.clone());
        let thread = session.thread("t1");

        let id = thread.send_text("hi").await.unwrap();

        assert_eq!(id, "sent-1");
        assert_eq!(
            outbox.take(),
            vec![SentMessage {
                thread_id: "t1".into(),
                text: "hi".into(),
            }]
        );
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn test_scripted_session_drains_then_ends() {
        let mut session = ScriptedSession::new("me", Vec::new())
            .with_credentials(serde_json::json!({ "cookie": "abc" }));
        assert_eq!(session.user_id(), "me");
        assert_eq!(session.remaining(), 0);
        assert!(tokio_test::block_on(session.next_event()).unwrap().is_none());
        assert_eq!(session.credentials().unwrap()["cookie"], "abc");
    }
}
