//! Bots and the dispatcher.
//!
//! A [`Bot`] owns a registry of listeners and commands. Creating a bot
//! registers the command router, the derivation pipeline and the built-in
//! `help` and `ping` commands, in that order, under the source label
//! `"core"`. Plugins and user code append after that.
//!
//! Bots are created through [`BotManager::add_bot`](crate::BotManager::add_bot)
//! and become shared (`Arc<Bot>`) once the manager is started.
//!
//! # Dispatch
//!
//! [`Bot::dispatch`] runs every listener registered for the event's exact
//! [`EventKind`], in registration order, one after another. Handlers that
//! take a [`BotRef`] may dispatch derived events through it; such nested
//! dispatches complete before the outer listener resumes.
//!
//! ```rust,ignore
//! let fleet = manager.start()?;
//! let bot = fleet.bot(id)?;
//! bot.dispatch(RawMessage::new(author, thread, data)).await?;
//! ```

use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, Level, debug, error, info, span, trace, warn};

use crate::builtin;
use crate::command::{Command, CommandDoc};
use crate::error::{DispatchError, DispatchResult, RegistrationError, RegistrationResult, RoutingResult};
use crate::event::Event;
use crate::handler::{BotRef, BoxFuture};
use crate::listener::Listener;
use crate::pipeline;
use crate::plugin::{LoadedPlugin, Plugin};
use crate::registry::Registry;
use crate::router::{BotId, ThreadMap};

/// Source label of everything a bot registers on creation.
pub const CORE_SOURCE: &str = "core";

// =============================================================================
// Dispatch settings
// =============================================================================

/// What happens when a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// The first failure aborts the dispatch and is returned to the caller.
    #[default]
    Propagate,
    /// Failures are logged and the remaining handlers still run.
    Isolate,
}

/// Per-bot dispatch behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Deepest allowed chain of re-entrant dispatches.
    pub max_depth: usize,
    pub fault_policy: FaultPolicy,
}

impl DispatchSettings {
    pub const DEFAULT_MAX_DEPTH: usize = 16;

    /// Depth at which the built-in pipeline dispatches a mention command:
    /// raw(0) -> message(1) -> text(2) -> mention(3) -> command(4).
    /// A smaller `max_depth` rejects every mention command.
    pub const PIPELINE_DEPTH: usize = 4;
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            fault_policy: FaultPolicy::default(),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// A bot: a registry, its loaded plugins and its settings.
pub struct Bot {
    id: BotId,
    name: String,
    settings: Arc<Value>,
    dispatch: DispatchSettings,
    registry: Registry,
    plugins: Vec<LoadedPlugin>,
    threads: Arc<ThreadMap>,
}

impl Bot {
    pub(crate) fn new(
        id: BotId,
        name: String,
        settings: Arc<Value>,
        dispatch: DispatchSettings,
        threads: Arc<ThreadMap>,
    ) -> RegistrationResult<Self> {
        let mut bot = Self {
            id,
            name,
            settings,
            dispatch,
            registry: Registry::new(),
            plugins: Vec::new(),
            threads,
        };

        bot.add_listener(builtin::command_router()?, CORE_SOURCE);
        for listener in pipeline::core_listeners()? {
            bot.add_listener(listener, CORE_SOURCE);
        }
        for command in builtin::core_commands()? {
            bot.add_command(command, CORE_SOURCE);
        }

        Ok(bot)
    }

    pub fn id(&self) -> BotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque settings this bot was created with.
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Deserializes the bot's settings into `T`.
    pub fn settings_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&*self.settings)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        self.dispatch
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Loaded plugins, in load order.
    pub fn plugins(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Appends a listener under the given source label.
    pub fn add_listener(&mut self, listener: Listener, source: impl Into<Arc<str>>) -> &mut Self {
        let source = source.into();
        info!(
            bot = %self.name,
            source = %source,
            listener = %listener.name(),
            event = %listener.kind(),
            "Registered listener"
        );
        self.registry.add_listener(listener, source);
        self
    }

    /// Appends a command under the given source label.
    pub fn add_command(&mut self, command: Command, source: impl Into<Arc<str>>) -> &mut Self {
        let source = source.into();
        info!(
            bot = %self.name,
            source = %source,
            command = %command.name(),
            "Registered command"
        );
        self.registry.add_command(command, source);
        self
    }

    /// Loads a plugin into this bot.
    ///
    /// Builds the plugin's [`setup`](Plugin::setup), runs its load hook, then
    /// registers the setup's listeners and commands under the plugin's name.
    ///
    /// A failing setup leaves the bot untouched. Registrations a load hook
    /// made before failing are kept.
    pub fn load_plugin(&mut self, plugin: Arc<dyn Plugin>) -> RegistrationResult<&mut Self> {
        let name: Arc<str> = plugin.name().into();
        debug!(bot = %self.name, plugin = %name, "Loading plugin");

        let setup = Arc::clone(&plugin).setup()?;
        plugin
            .on_load(self)
            .map_err(|error| RegistrationError::PluginLoad {
                plugin: name.to_string(),
                reason: error.to_string(),
            })?;

        let mut own = Registry::new();
        for listener in setup.listeners {
            own.add_listener(listener.clone(), Arc::clone(&name));
            self.add_listener(listener, Arc::clone(&name));
        }
        for command in setup.commands {
            own.add_command(command.clone(), Arc::clone(&name));
            self.add_command(command, Arc::clone(&name));
        }

        info!(
            bot = %self.name,
            plugin = %name,
            listeners = own.listener_count(),
            commands = own.command_count(),
            "Loaded plugin"
        );
        self.plugins.push(LoadedPlugin::new(plugin, own));
        Ok(self)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every command this bot knows, one entry per name.
    ///
    /// The bot registry already holds plugin commands, so plugin registries
    /// only contribute names the bot registry lacks. With `filter`, only the
    /// command with that exact name is returned.
    pub fn get_all_commands(&self, filter: Option<&str>) -> Vec<CommandDoc> {
        let plugin_docs = self.plugins.iter().flat_map(|p| p.registry().command_docs());
        let mut docs: Vec<CommandDoc> = Vec::new();
        for doc in self.registry.command_docs().chain(plugin_docs) {
            if filter.is_some_and(|name| name != doc.name) {
                continue;
            }
            if !docs.iter().any(|seen| seen.name == doc.name) {
                docs.push(doc);
            }
        }
        docs
    }

    /// Commands contributed by the plugin called `plugin`.
    pub fn plugin_commands(&self, plugin: &str) -> Option<Vec<CommandDoc>> {
        self.plugins
            .iter()
            .find(|loaded| loaded.name() == plugin)
            .map(|loaded| loaded.registry().command_docs().collect())
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Claims `thread` for this bot. Works before and after start.
    pub fn claim_thread(&self, thread: &str) -> RoutingResult<()> {
        self.threads.assign(thread, self.id, &self.name)
    }

    /// Threads currently assigned to this bot.
    pub fn threads(&self) -> Vec<String> {
        self.threads.threads_of(self.id)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches `event` at the top level.
    pub fn dispatch(self: &Arc<Self>, event: impl Into<Event>) -> BoxFuture<'static, DispatchResult> {
        self.dispatch_at(event.into(), 0)
    }

    /// Dispatches `event` at nesting `depth`.
    pub(crate) fn dispatch_at(self: &Arc<Self>, event: Event, depth: usize) -> BoxFuture<'static, DispatchResult> {
        let bot = Arc::clone(self);
        let kind = event.kind();
        let span = span!(Level::DEBUG, "dispatch", bot = %bot.name, event = %kind, depth);

        async move {
            let max_depth = bot.dispatch.max_depth;
            if depth > max_depth {
                warn!(max_depth, "Dispatch depth exceeded");
                return Err(DispatchError::DepthExceeded { kind, max_depth });
            }

            let bot_ref = BotRef::new(Arc::clone(&bot), depth);
            let entries = bot.registry.listeners(kind);
            trace!(listeners = entries.len(), "Dispatching event");

            for entry in entries {
                let outcome = entry.item.handler().call(event.clone(), &bot_ref).await;
                let Err(error) = outcome else { continue };

                let error = DispatchError::from_listener(kind, &entry.source, error);
                match bot.dispatch.fault_policy {
                    FaultPolicy::Propagate => return Err(error),
                    FaultPolicy::Isolate => error!(
                        listener = %entry.item.name(),
                        source = %entry.source,
                        error = %error,
                        "Listener failed, continuing"
                    ),
                }
            }

            Ok(())
        }
        .instrument(span)
        .boxed()
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("listeners", &self.registry.listener_count())
            .field("commands", &self.registry.command_count())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde::Deserialize;

    use super::*;
    use crate::event::{CommandEvent, EventKind, MentionEvent, MessageEvent, RawMessage, SessionNotice};
    use crate::message::{MessageData, SessionNoticeKind};
    use crate::error::BoxError;
    use crate::plugin::PluginSetup;
    use crate::router::BotManager;
    use crate::session::{MemoryOutbox, SessionHandle};

    fn started(configure: impl FnOnce(&mut Bot)) -> Arc<Bot> {
        let mut manager = BotManager::new();
        let bot = manager.add_bot("test").unwrap();
        configure(bot);
        let id = bot.id();
        manager.start().unwrap().bot(id).unwrap().clone()
    }

    fn notice() -> SessionNotice {
        SessionNotice {
            notice: SessionNoticeKind::Connected,
            at: time::OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_core_registration_order() {
        let bot = started(|_| {});
        let registry = bot.registry();

        let first = &registry.listeners(EventKind::Command)[0];
        assert_eq!(first.item.name(), "command_router");
        assert_eq!(&*first.source, CORE_SOURCE);
        assert_eq!(registry.listeners(EventKind::TextMessage).len(), 2);

        let names: Vec<_> = registry.command_names().collect();
        assert_eq!(names, ["help", "ping"]);
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let bot = started(|bot| {
            for label in ["a", "b", "c"] {
                let order = Arc::clone(&order);
                let listener = Listener::on::<SessionNotice>()
                    .handler(move |_event: Arc<SessionNotice>| {
                        let order = Arc::clone(&order);
                        async move { order.lock().push(label) }
                    })
                    .build()
                    .unwrap();
                bot.add_listener(listener, "test");
            }
        });

        bot.dispatch(notice()).await.unwrap();
        assert_eq!(*order.lock(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_exact_variant_only() {
        let hits = Arc::new(AtomicUsize::new(0));
        let bot = started(|bot| {
            let hits = Arc::clone(&hits);
            let listener = Listener::on::<MessageEvent>()
                .handler(move |_msg: Arc<MessageEvent>| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .build()
                .unwrap();
            bot.add_listener(listener, "test");
        });

        let session = SessionHandle::new("me", MemoryOutbox::new());
        let raw = RawMessage::new("u1", session.thread("t1"), MessageData::new("m1").with_text("hi"));
        bot.dispatch(raw).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untyped_listener_receives_whole_event() {
        let seen = Arc::new(Mutex::new(None));
        let bot = started(|bot| {
            let seen = Arc::clone(&seen);
            let listener = Listener::any()
                .kind(EventKind::SessionNotice)
                .handler(move |event: Event| {
                    *seen.lock() = Some(event.kind());
                    async {}
                })
                .build()
                .unwrap();
            bot.add_listener(listener, "test");
        });

        bot.dispatch(notice()).await.unwrap();
        assert_eq!(*seen.lock(), Some(EventKind::SessionNotice));
    }

    #[tokio::test]
    async fn test_propagate_stops_at_first_failure() {
        let after = Arc::new(AtomicUsize::new(0));
        let bot = started(|bot| {
            let failing = Listener::on::<SessionNotice>()
                .handler(|_e: Arc<SessionNotice>| async { Err::<(), _>("broken") })
                .build()
                .unwrap();
            let after = Arc::clone(&after);
            let counting = Listener::on::<SessionNotice>()
                .handler(move |_e: Arc<SessionNotice>| {
                    after.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .build()
                .unwrap();
            bot.add_listener(failing, "faulty").add_listener(counting, "test");
        });

        let err = bot.dispatch(notice()).await.unwrap_err();
        match err {
            DispatchError::Listener { kind, origin, .. } => {
                assert_eq!(kind, EventKind::SessionNotice);
                assert_eq!(origin, "faulty");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_isolate_keeps_going() {
        let after = Arc::new(AtomicUsize::new(0));
        let mut manager = BotManager::new().with_dispatch(DispatchSettings {
            fault_policy: FaultPolicy::Isolate,
            ..Default::default()
        });
        let bot = manager.add_bot("isolated").unwrap();
        let failing = Listener::on::<SessionNotice>()
            .handler(|_e: Arc<SessionNotice>| async { Err::<(), _>("broken") })
            .build()
            .unwrap();
        let counter = Arc::clone(&after);
        let counting = Listener::on::<SessionNotice>()
            .handler(move |_e: Arc<SessionNotice>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {}
            })
            .build()
            .unwrap();
        bot.add_listener(failing, "faulty").add_listener(counting, "test");
        let id = bot.id();
        let fleet = manager.start().unwrap();

        fleet.bot(id).unwrap().dispatch(notice()).await.unwrap();
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cyclic_dispatch_hits_depth_limit() {
        let mut manager = BotManager::new().with_dispatch(DispatchSettings {
            max_depth: 3,
            ..Default::default()
        });
        let bot = manager.add_bot("loop").unwrap();
        let echo = Listener::on::<SessionNotice>()
            .handler_with_bot(|event: Arc<SessionNotice>, bot: BotRef| async move {
                bot.dispatch(event).await
            })
            .build()
            .unwrap();
        bot.add_listener(echo, "test");
        let id = bot.id();
        let fleet = manager.start().unwrap();

        let err = fleet.bot(id).unwrap().dispatch(notice()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::DepthExceeded {
                kind: EventKind::SessionNotice,
                max_depth: 3,
            }
        ));
    }

    #[tokio::test]
    async fn test_mention_command_needs_pipeline_depth() {
        async fn mention_ping(max_depth: usize) -> (DispatchResult, Arc<MemoryOutbox>) {
            let mut manager = BotManager::new().with_dispatch(DispatchSettings {
                max_depth,
                ..Default::default()
            });
            let id = manager.add_bot("main").unwrap().id();
            let fleet = manager.start().unwrap();

            let outbox = MemoryOutbox::new();
            let session = SessionHandle::new("me", outbox.clone());
            let data = MessageData::new("m1")
                .with_text("@me ping")
                .with_mention(crate::message::Mention::new("me", 0, 3));
            let result = fleet
                .bot(id)
                .unwrap()
                .dispatch(RawMessage::new("u1", session.thread("t1"), data))
                .await;
            (result, outbox)
        }

        let (result, outbox) = mention_ping(DispatchSettings::PIPELINE_DEPTH).await;
        result.unwrap();
        assert_eq!(outbox.take()[0].text, "PONG");

        let (result, outbox) = mention_ping(DispatchSettings::PIPELINE_DEPTH - 1).await;
        assert!(matches!(
            result,
            Err(DispatchError::DepthExceeded {
                kind: EventKind::Command,
                ..
            })
        ));
        assert!(outbox.take().is_empty());
    }

    struct LoudPing(Arc<AtomicUsize>);

    impl Plugin for LoudPing {
        fn name(&self) -> &str {
            "loud"
        }

        fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
            let hits = Arc::clone(&self.0);
            let ping = Command::new("ping")
                .doc("Ping loudly.")
                .handler(move |_cmd: Arc<CommandEvent>| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .build()?;
            Ok(PluginSetup::new().command(ping))
        }
    }

    #[tokio::test]
    async fn test_shadowed_command_lists_first_doc_and_runs_every_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let bot = started(|bot| {
            bot.load_plugin(Arc::new(LoudPing(Arc::clone(&hits)))).unwrap();
        });

        let docs = bot.get_all_commands(Some("ping"));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc, "Ping the bot. Useful to see if it's working.");
        assert_eq!(bot.plugin_commands("loud").unwrap()[0].doc, "Ping loudly.");

        let outbox = MemoryOutbox::new();
        let session = SessionHandle::new("me", outbox.clone());
        let data = MessageData::new("m1").with_text(".ping");
        bot.dispatch(RawMessage::new("u1", session.thread("t1"), data))
            .await
            .unwrap();

        let sent: Vec<String> = outbox.take().into_iter().map(|m| m.text).collect();
        assert_eq!(sent, ["PONG"]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct BrokenSetup;

    impl Plugin for BrokenSetup {
        fn name(&self) -> &str {
            "broken"
        }

        fn on_load(&self, bot: &mut Bot) -> Result<(), BoxError> {
            let listener = Listener::on::<SessionNotice>()
                .handler(|_e: Arc<SessionNotice>| async {})
                .build()?;
            bot.add_listener(listener, "broken");
            Ok(())
        }

        fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
            let nameless = Command::new("")
                .handler(|_cmd: Arc<CommandEvent>| async {})
                .build()?;
            Ok(PluginSetup::new().command(nameless))
        }
    }

    #[test]
    fn test_failed_setup_leaves_bot_untouched() {
        let mut manager = BotManager::new();
        let bot = manager.add_bot("main").unwrap();
        let listeners = bot.registry().listener_count();

        let result = bot.load_plugin(Arc::new(BrokenSetup));
        assert!(matches!(result, Err(RegistrationError::EmptyCommandName)));

        assert_eq!(bot.registry().listener_count(), listeners);
        assert!(bot.plugins().is_empty());
    }

    #[tokio::test]
    async fn test_bot_ref_exposes_depth() {
        let depths = Arc::new(Mutex::new(Vec::new()));
        let bot = started(|bot| {
            let depths = Arc::clone(&depths);
            let listener = Listener::on::<MentionEvent>()
                .handler_with_bot(move |_e: Arc<MentionEvent>, bot: BotRef| {
                    depths.lock().push(bot.depth());
                    async {}
                })
                .build()
                .unwrap();
            bot.add_listener(listener, "test");
        });

        let session = SessionHandle::new("me", MemoryOutbox::new());
        let data = MessageData::new("m1")
            .with_text("@me hi")
            .with_mention(crate::message::Mention::new("me", 0, 3));
        bot.dispatch(RawMessage::new("u1", session.thread("t1"), data))
            .await
            .unwrap();

        // raw(0) -> message(1) -> text(2) -> mention(3)
        assert_eq!(*depths.lock(), [3]);
    }

    #[test]
    fn test_settings_as_typed() {
        #[derive(Deserialize)]
        struct Greeting {
            greeting: String,
        }

        let mut manager = BotManager::new();
        let bot = manager
            .add_bot_with_settings("greeter", serde_json::json!({ "greeting": "hey" }))
            .unwrap();
        let settings: Greeting = bot.settings_as().unwrap();
        assert_eq!(settings.greeting, "hey");
    }

    #[test]
    fn test_get_all_commands_filter() {
        let bot = started(|bot| {
            let command = Command::new("ping")
                .doc("Another ping")
                .handler(|_c: Arc<CommandEvent>| async {})
                .build()
                .unwrap();
            bot.add_command(command, "test");
        });

        let all = bot.get_all_commands(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].name, "ping");
        assert_eq!(all[1].doc, "Ping the bot. Useful to see if it's working.");

        let filtered = bot.get_all_commands(Some("help"));
        assert_eq!(filtered.len(), 1);
        assert!(bot.get_all_commands(Some("missing")).is_empty());
    }
}
