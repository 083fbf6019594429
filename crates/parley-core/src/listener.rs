//! Listeners: handlers bound to one event variant.
//!
//! Listeners are built with a typed builder. The handler's parameter type
//! fixes the variant, so most listeners need nothing more than:
//!
//! ```rust,ignore
//! let listener = Listener::on::<ReactionEvent>()
//!     .name("log_reactions")
//!     .handler(|event: Arc<ReactionEvent>| async move {
//!         tracing::info!(author = %event.author, "Reaction changed");
//!     })
//!     .build()?;
//! ```
//!
//! A listener that wants the whole [`Event`] uses [`Listener::any`] and must
//! say which variant it listens to with [`ListenerBuilder::kind`].
//!
//! All validation happens in [`ListenerBuilder::build`]:
//!
//! | situation                                   | error                                   |
//! |---------------------------------------------|-----------------------------------------|
//! | no handler attached                         | [`RegistrationError::MissingHandler`]   |
//! | `.kind(k)` disagrees with the handler type  | [`RegistrationError::KindMismatch`]     |
//! | `any()` listener without `.kind(k)`         | [`RegistrationError::UnresolvedKind`]   |

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;

use crate::error::{RegistrationError, RegistrationResult};
use crate::event::{Event, EventKind, EventVariant};
use crate::handler::{Arity, BotRef, Handler, IntoHandlerResult};

/// A handler registered for exactly one [`EventKind`].
///
/// Immutable once built and cheap to clone.
#[derive(Clone)]
pub struct Listener {
    kind: EventKind,
    name: Cow<'static, str>,
    handler: Handler<Event>,
}

impl Listener {
    /// Starts a listener whose handler receives `T`'s payload.
    pub fn on<T: EventVariant>() -> ListenerBuilder<T> {
        ListenerBuilder {
            declared: None,
            name: None,
            handler: None,
            _marker: PhantomData,
        }
    }

    /// Starts a listener whose handler receives the whole [`Event`].
    pub fn any() -> ListenerBuilder<Event> {
        Self::on::<Event>()
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.handler.arity()
    }

    pub(crate) fn handler(&self) -> &Handler<Event> {
        &self.handler
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("arity", &self.arity())
            .finish()
    }
}

/// Builder for [`Listener`].
pub struct ListenerBuilder<T: EventVariant> {
    declared: Option<EventKind>,
    name: Option<Cow<'static, str>>,
    handler: Option<Handler<Event>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: EventVariant> ListenerBuilder<T> {
    /// Declares the variant explicitly.
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.declared = Some(kind);
        self
    }

    /// Sets a name used in logs. Defaults to the variant name.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a handler taking only the event.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T::Payload) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        self.handler = Some(Handler::event_only(move |event: Event| {
            let payload = T::extract(&event);
            let fut = payload.map(&f);
            async move {
                match fut {
                    Some(fut) => fut.await.into_handler_result(),
                    None => Err(mismatched(&event)),
                }
            }
        }));
        self
    }

    /// Attaches a handler taking the event and a [`BotRef`].
    pub fn handler_with_bot<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T::Payload, BotRef) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        self.handler = Some(Handler::with_bot(move |event: Event, bot: BotRef| {
            let fut = T::extract(&event).map(|payload| f(payload, bot));
            async move {
                match fut {
                    Some(fut) => fut.await.into_handler_result(),
                    None => Err(mismatched(&event)),
                }
            }
        }));
        self
    }

    /// Validates the builder and produces the listener.
    pub fn build(self) -> RegistrationResult<Listener> {
        let handler = self.handler.ok_or(RegistrationError::MissingHandler)?;

        let kind = match (self.declared, T::KIND) {
            (Some(declared), Some(inferred)) if declared != inferred => {
                return Err(RegistrationError::KindMismatch { declared, inferred });
            }
            (Some(kind), _) | (None, Some(kind)) => kind,
            (None, None) => return Err(RegistrationError::UnresolvedKind),
        };

        Ok(Listener {
            kind,
            name: self.name.unwrap_or(Cow::Borrowed(kind.name())),
            handler,
        })
    }
}

fn mismatched(event: &Event) -> crate::error::BoxError {
    format!("listener received unexpected event variant '{}'", event.name()).into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::{ReactionEvent, TextMessage};

    #[test]
    fn test_typed_listener_infers_kind() {
        let listener = Listener::on::<TextMessage>()
            .handler(|_msg: Arc<TextMessage>| async {})
            .build()
            .unwrap();

        assert_eq!(listener.kind(), EventKind::TextMessage);
        assert_eq!(listener.arity(), Arity::EventOnly);
        assert_eq!(listener.name(), "text_message");
    }

    #[test]
    fn test_matching_explicit_kind_is_accepted() {
        let listener = Listener::on::<ReactionEvent>()
            .kind(EventKind::Reaction)
            .name("reactions")
            .handler_with_bot(|_event: Arc<ReactionEvent>, _bot: BotRef| async {})
            .build()
            .unwrap();

        assert_eq!(listener.kind(), EventKind::Reaction);
        assert_eq!(listener.arity(), Arity::WithBot);
        assert_eq!(listener.name(), "reactions");
    }

    #[test]
    fn test_missing_handler_is_rejected() {
        let err = Listener::on::<TextMessage>().build().unwrap_err();
        assert_eq!(err, RegistrationError::MissingHandler);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let err = Listener::on::<TextMessage>()
            .kind(EventKind::Message)
            .handler(|_msg: Arc<TextMessage>| async {})
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            RegistrationError::KindMismatch {
                declared: EventKind::Message,
                inferred: EventKind::TextMessage,
            }
        );
    }

    #[test]
    fn test_untyped_listener_requires_kind() {
        let err = Listener::any()
            .handler(|_event: Event| async {})
            .build()
            .unwrap_err();
        assert_eq!(err, RegistrationError::UnresolvedKind);

        let listener = Listener::any()
            .kind(EventKind::ThreadUpdate)
            .handler(|_event: Event| async {})
            .build()
            .unwrap();
        assert_eq!(listener.kind(), EventKind::ThreadUpdate);
    }
}
