//! Handler plumbing shared by listeners and commands.
//!
//! A handler is an async function that takes either just its payload or its
//! payload plus a [`BotRef`]. The choice is made when the handler is attached
//! and recorded as its [`Arity`]:
//!
//! ```rust,ignore
//! // Event only
//! Listener::on::<TextMessage>().handler(|msg: Arc<TextMessage>| async move {
//!     tracing::info!(text = %msg.text, "Got text");
//! });
//!
//! // Event and bot, for handlers that re-dispatch or inspect the registry
//! Listener::on::<TextMessage>().handler_with_bot(|msg: Arc<TextMessage>, bot: BotRef| async move {
//!     bot.dispatch(derive(&msg)).await
//! });
//! ```
//!
//! Handlers may return `()` or any `Result<(), E>` whose error converts into
//! [`BoxError`]; see [`IntoHandlerResult`].

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use futures::FutureExt;
pub use futures::future::BoxFuture;

use crate::bot::Bot;
use crate::error::{BoxError, DispatchResult, HandlerResult};
use crate::event::Event;

// =============================================================================
// Arity
// =============================================================================

/// How many arguments a handler takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// `(event)`
    EventOnly,
    /// `(event, bot)`
    WithBot,
}

impl Arity {
    pub fn param_count(self) -> usize {
        match self {
            Arity::EventOnly => 1,
            Arity::WithBot => 2,
        }
    }
}

// =============================================================================
// Return values
// =============================================================================

/// Return types a handler may produce.
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult {
        Ok(())
    }
}

impl<E> IntoHandlerResult for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

// =============================================================================
// Erased handler
// =============================================================================

type EventOnlyFn<P> = dyn Fn(P) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type WithBotFn<P> = dyn Fn(P, BotRef) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A type-erased handler receiving payloads of type `P`.
pub struct Handler<P> {
    inner: HandlerInner<P>,
}

enum HandlerInner<P> {
    EventOnly(Arc<EventOnlyFn<P>>),
    WithBot(Arc<WithBotFn<P>>),
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        let inner = match &self.inner {
            HandlerInner::EventOnly(f) => HandlerInner::EventOnly(Arc::clone(f)),
            HandlerInner::WithBot(f) => HandlerInner::WithBot(Arc::clone(f)),
        };
        Self { inner }
    }
}

impl<P: Send + 'static> Handler<P> {
    /// Wraps a handler taking only the payload.
    pub fn event_only<F, Fut>(f: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        Self {
            inner: HandlerInner::EventOnly(Arc::new(move |payload| {
                let fut = f(payload);
                async move { fut.await.into_handler_result() }.boxed()
            })),
        }
    }

    /// Wraps a handler taking the payload and a bot reference.
    pub fn with_bot<F, Fut>(f: F) -> Self
    where
        F: Fn(P, BotRef) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoHandlerResult,
    {
        Self {
            inner: HandlerInner::WithBot(Arc::new(move |payload, bot| {
                let fut = f(payload, bot);
                async move { fut.await.into_handler_result() }.boxed()
            })),
        }
    }

    pub fn arity(&self) -> Arity {
        match self.inner {
            HandlerInner::EventOnly(_) => Arity::EventOnly,
            HandlerInner::WithBot(_) => Arity::WithBot,
        }
    }

    /// Invokes the handler, passing the bot only if its arity asks for it.
    pub fn call(&self, payload: P, bot: &BotRef) -> BoxFuture<'static, HandlerResult> {
        match &self.inner {
            HandlerInner::EventOnly(f) => f(payload),
            HandlerInner::WithBot(f) => f(payload, bot.clone()),
        }
    }
}

// =============================================================================
// BotRef
// =============================================================================

/// A bot as seen from inside a handler.
///
/// Dereferences to [`Bot`]. Dispatching through a `BotRef` goes one level
/// deeper than the dispatch that invoked the handler; see
/// [`DispatchSettings::max_depth`](crate::DispatchSettings::max_depth).
#[derive(Clone)]
pub struct BotRef {
    bot: Arc<Bot>,
    depth: usize,
}

impl BotRef {
    pub(crate) fn new(bot: Arc<Bot>, depth: usize) -> Self {
        Self { bot, depth }
    }

    /// The shared bot.
    pub fn arc(&self) -> &Arc<Bot> {
        &self.bot
    }

    /// Nesting depth of the dispatch that produced this reference.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Dispatches a derived event through the same bot.
    pub fn dispatch(&self, event: impl Into<Event>) -> BoxFuture<'static, DispatchResult> {
        self.bot.dispatch_at(event.into(), self.depth + 1)
    }
}

impl Deref for BotRef {
    type Target = Bot;

    fn deref(&self) -> &Bot {
        &self.bot
    }
}

impl std::fmt::Debug for BotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRef")
            .field("bot", &self.bot.name())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_and_result_returns() {
        assert!(().into_handler_result().is_ok());
        assert!(Ok::<(), std::io::Error>(()).into_handler_result().is_ok());

        let err = Err::<(), _>("nope").into_handler_result().unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_arity_reflects_constructor() {
        let one: Handler<u32> = Handler::event_only(|_n: u32| async {});
        let two: Handler<u32> = Handler::with_bot(|_n: u32, _bot: BotRef| async {});

        assert_eq!(one.arity(), Arity::EventOnly);
        assert_eq!(one.arity().param_count(), 1);
        assert_eq!(two.clone().arity(), Arity::WithBot);
        assert_eq!(two.arity().param_count(), 2);
    }
}
