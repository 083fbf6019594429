//! Plugins: reusable bundles of listeners and commands.
//!
//! A plugin returns its listeners and commands from [`Plugin::setup`]. Since
//! `setup` receives `Arc<Self>`, handlers can capture the plugin instance and
//! use its state; only the event and bot count towards a handler's arity.
//!
//! ```rust,ignore
//! struct Counter {
//!     seen: AtomicUsize,
//! }
//!
//! impl Plugin for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
//!         let this = Arc::clone(&self);
//!         let count = Command::new("count")
//!             .doc("Show how many messages were seen.")
//!             .handler(move |cmd: Arc<CommandEvent>| {
//!                 let this = Arc::clone(&this);
//!                 async move {
//!                     let seen = this.seen.load(Ordering::Relaxed);
//!                     cmd.thread.send_text(&seen.to_string()).await.map(drop)
//!                 }
//!             })
//!             .build()?;
//!         Ok(PluginSetup::new().command(count))
//!     }
//! }
//!
//! bot.load_plugin(Arc::new(Counter { seen: AtomicUsize::new(0) }))?;
//! ```
//!
//! Everything a plugin contributes is registered under its name, both in the
//! bot's registry and in the plugin's own registry kept alongside it.

use std::sync::Arc;

use crate::bot::Bot;
use crate::command::Command;
use crate::error::{BoxError, RegistrationResult};
use crate::listener::Listener;
use crate::registry::Registry;

/// A bundle of listeners and commands that can be loaded into a bot.
pub trait Plugin: Send + Sync + 'static {
    /// Name used as the source label of everything the plugin registers.
    fn name(&self) -> &str;

    /// Runs after [`setup`](Plugin::setup) succeeded and before its
    /// listeners and commands are registered.
    ///
    /// May read the bot's settings or register listeners on the bot directly.
    fn on_load(&self, bot: &mut Bot) -> Result<(), BoxError> {
        let _ = bot;
        Ok(())
    }

    /// Returns the plugin's own listeners and commands.
    fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
        Ok(PluginSetup::new())
    }
}

/// What a plugin contributes, in registration order.
#[derive(Debug, Clone, Default)]
pub struct PluginSetup {
    pub listeners: Vec<Listener>,
    pub commands: Vec<Command>,
}

impl PluginSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }
}

/// A plugin loaded into a bot, with the registry of what it contributed.
#[derive(Clone)]
pub struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    registry: Registry,
}

impl LoadedPlugin {
    pub(crate) fn new(plugin: Arc<dyn Plugin>, registry: Registry) -> Self {
        Self { plugin, registry }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::command::CommandDoc;
    use crate::error::RegistrationError;
    use crate::event::{CommandEvent, EventKind, RawMessage, TextMessage};
    use crate::handler::BotRef;
    use crate::message::MessageData;
    use crate::router::BotManager;
    use crate::session::{MemoryOutbox, SessionHandle};

    struct Counter {
        seen: AtomicUsize,
    }

    impl Plugin for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
            let this = Arc::clone(&self);
            let count_texts = Listener::on::<TextMessage>()
                .handler(move |_msg: Arc<TextMessage>| {
                    this.seen.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .build()?;
            let this = Arc::clone(&self);
            let report = Command::new("count")
                .doc("Show how many texts were seen.")
                .handler_with_bot(move |cmd: Arc<CommandEvent>, _bot: BotRef| {
                    let seen = this.seen.load(Ordering::SeqCst);
                    async move { cmd.thread.send_text(&seen.to_string()).await.map(drop) }
                })
                .build()?;
            Ok(PluginSetup::new().listener(count_texts).command(report))
        }
    }

    struct Greeter;

    #[derive(Deserialize)]
    struct GreeterSettings {
        greeting: String,
    }

    impl Plugin for Greeter {
        fn name(&self) -> &str {
            "greeter"
        }

        fn on_load(&self, bot: &mut Bot) -> Result<(), BoxError> {
            let settings: GreeterSettings = bot.settings_as()?;
            let greet = Command::new("hi")
                .doc("Say hi back.")
                .handler(move |cmd: Arc<CommandEvent>| {
                    let greeting = settings.greeting.clone();
                    async move { cmd.thread.send_text(&greeting).await.map(drop) }
                })
                .build()?;
            bot.add_command(greet, self.name());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_instance_bound_handlers_share_state() {
        let plugin = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let outbox = MemoryOutbox::new();
        let mut manager = BotManager::new();
        manager
            .add_bot("b")
            .unwrap()
            .load_plugin(plugin.clone())
            .unwrap();
        let fleet = manager.start().unwrap();
        let bot = fleet.bots()[0].clone();
        let thread = SessionHandle::new("me", outbox.clone()).thread("t1");

        for text in ["one", "two", ".count"] {
            let raw = RawMessage::new("u1", thread.clone(), MessageData::new("m").with_text(text));
            bot.dispatch(raw).await.unwrap();
        }

        // The core command listener precedes the plugin's, so ".count" is
        // counted only after the command has replied.
        assert_eq!(outbox.take()[0].text, "2");
        assert_eq!(plugin.seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_plugin_entries_are_tagged_and_tracked() {
        let mut manager = BotManager::new();
        let bot = manager.add_bot("b").unwrap();
        bot.load_plugin(Arc::new(Counter {
            seen: AtomicUsize::new(0),
        }))
        .unwrap();

        let texts = bot.registry().listeners(EventKind::TextMessage);
        assert_eq!(&*texts.last().unwrap().source, "counter");
        assert_eq!(bot.plugins().len(), 1);
        assert_eq!(bot.plugins()[0].registry().listener_count(), 1);
        assert_eq!(
            bot.plugin_commands("counter"),
            Some(vec![CommandDoc::new("count", "Show how many texts were seen.")])
        );
        assert_eq!(bot.plugin_commands("missing"), None);

        let names: Vec<_> = bot.get_all_commands(None).into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["help", "ping", "count"]);
    }

    #[test]
    fn test_on_load_reads_settings_and_registers() {
        let mut manager = BotManager::new();
        let bot = manager
            .add_bot_with_settings("b", serde_json::json!({ "greeting": "hello" }))
            .unwrap();
        bot.load_plugin(Arc::new(Greeter)).unwrap();

        let hi = bot.registry().commands("hi");
        assert_eq!(hi.len(), 1);
        assert_eq!(&*hi[0].source, "greeter");
    }

    #[test]
    fn test_failing_on_load_is_a_registration_error() {
        let mut manager = BotManager::new();
        let bot = manager.add_bot("b").unwrap();

        let err = bot.load_plugin(Arc::new(Greeter)).unwrap_err();
        assert!(matches!(err, RegistrationError::PluginLoad { ref plugin, .. } if plugin == "greeter"));
        assert!(bot.plugins().is_empty());
    }
}
