//! Named commands.
//!
//! A command is invoked by the bot's command router whenever a
//! [`CommandEvent`] with a matching name is dispatched. Several commands may
//! share a name; all of them run, in registration order.
//!
//! ```rust,ignore
//! let echo = Command::new("echo")
//!     .doc("Repeat the message body back to the thread.")
//!     .handler(|cmd: Arc<CommandEvent>| async move {
//!         cmd.thread.send_text(&cmd.body).await.map(drop)
//!     })
//!     .build()?;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, RegistrationResult};
use crate::event::CommandEvent;
use crate::handler::{Arity, BotRef, Handler, IntoHandlerResult};

/// A named command handler.
#[derive(Clone)]
pub struct Command {
    name: Arc<str>,
    doc: Arc<str>,
    handler: Handler<Arc<CommandEvent>>,
}

impl Command {
    /// Starts building a command called `name`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            doc: String::new(),
            handler: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn arity(&self) -> Arity {
        self.handler.arity()
    }

    pub(crate) fn handler(&self) -> &Handler<Arc<CommandEvent>> {
        &self.handler
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arity", &self.arity())
            .finish()
    }
}

/// Builder for [`Command`].
pub struct CommandBuilder {
    name: String,
    doc: String,
    handler: Option<Handler<Arc<CommandEvent>>>,
}

impl CommandBuilder {
    /// Sets the help text. Surrounding whitespace is removed.
    pub fn doc(mut self, doc: impl AsRef<str>) -> Self {
        self.doc = doc.as_ref().trim().to_string();
        self
    }

    /// Attaches a handler taking only the command event.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        self.handler = Some(Handler::event_only(f));
        self
    }

    /// Attaches a handler taking the command event and a [`BotRef`].
    pub fn handler_with_bot<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandEvent>, BotRef) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        self.handler = Some(Handler::with_bot(f));
        self
    }

    pub fn build(self) -> RegistrationResult<Command> {
        if self.name.is_empty() {
            return Err(RegistrationError::EmptyCommandName);
        }
        let handler = self
            .handler
            .ok_or_else(|| RegistrationError::MissingCommandHandler(self.name.clone()))?;

        Ok(Command {
            name: self.name.into(),
            doc: self.doc.into(),
            handler,
        })
    }
}

/// A command name with its help text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDoc {
    pub name: String,
    pub doc: String,
}

impl CommandDoc {
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_is_trimmed() {
        let command = Command::new("echo")
            .doc("\n    Repeat the body.\n")
            .handler(|_cmd: Arc<CommandEvent>| async {})
            .build()
            .unwrap();

        assert_eq!(command.name(), "echo");
        assert_eq!(command.doc(), "Repeat the body.");
        assert_eq!(command.arity(), Arity::EventOnly);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let err = Command::new("")
            .handler(|_cmd: Arc<CommandEvent>| async {})
            .build()
            .unwrap_err();
        assert_eq!(err, RegistrationError::EmptyCommandName);
    }

    #[test]
    fn test_missing_handler_is_rejected() {
        let err = Command::new("ping").build().unwrap_err();
        assert_eq!(err, RegistrationError::MissingCommandHandler("ping".into()));
    }
}
