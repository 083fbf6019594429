//! Example plugins loaded into every bot of the demo fleet.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parley::prelude::*;
use serde::Deserialize;

// =============================================================================
// Greeter
// =============================================================================

#[derive(Debug, Deserialize)]
struct GreeterSettings {
    #[serde(default = "default_greeting")]
    greeting: String,
}

impl Default for GreeterSettings {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

fn default_greeting() -> String {
    "Hi there!".to_string()
}

/// Answers mentions with the bot's `greeting` setting and provides `echo`.
pub struct Greeter;

impl Plugin for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn on_load(&self, bot: &mut Bot) -> Result<(), BoxError> {
        let settings: GreeterSettings = bot.settings_as()?;
        info!(bot = bot.name(), greeting = %settings.greeting, "Greeter loaded");
        Ok(())
    }

    fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
        let greet = Listener::on::<MentionEvent>()
            .name("greet_on_mention")
            .handler_with_bot(greet)
            .build()?;
        let echo = Command::new("echo")
            .doc("Repeat the text after the command.")
            .handler(echo)
            .build()?;
        Ok(PluginSetup::new().listener(greet).command(echo))
    }
}

async fn greet(mention: Arc<MentionEvent>, bot: BotRef) -> SendResult<()> {
    let settings: GreeterSettings = bot.settings_as().unwrap_or_default();
    let reply = format!("{} ({})", settings.greeting, mention.author);
    mention.thread.send_text(&reply).await.map(drop)
}

async fn echo(cmd: Arc<CommandEvent>) -> SendResult<()> {
    let body = cmd.body.trim();
    if body.is_empty() {
        return Ok(());
    }
    cmd.thread.send_text(body).await.map(drop)
}

// =============================================================================
// Counter
// =============================================================================

/// Counts the text messages a bot sees and reports the total on `count`.
#[derive(Debug, Default)]
pub struct Counter {
    texts: AtomicUsize,
}

impl Plugin for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn setup(self: Arc<Self>) -> RegistrationResult<PluginSetup> {
        let this = Arc::clone(&self);
        let tally = Listener::on::<TextMessage>()
            .name("tally_texts")
            .handler(move |_text: Arc<TextMessage>| {
                this.texts.fetch_add(1, Ordering::Relaxed);
                async {}
            })
            .build()?;

        let this = Arc::clone(&self);
        let count = Command::new("count")
            .doc("Show how many text messages this bot has seen.")
            .handler(move |cmd: Arc<CommandEvent>| {
                let seen = this.texts.load(Ordering::Relaxed);
                async move {
                    cmd.thread
                        .send_text(&format!("Seen {seen} text messages."))
                        .await
                        .map(drop)
                }
            })
            .build()?;

        Ok(PluginSetup::new().listener(tally).command(count))
    }
}

#[cfg(test)]
mod tests {
    use parley::core::{MemoryOutbox, Mention, MessageData, RawMessage, SessionHandle};

    use super::*;

    fn fleet(settings: serde_json::Value) -> (Fleet, Arc<MemoryOutbox>, SessionHandle) {
        let mut manager = BotManager::new();
        manager
            .add_bot_with_settings("main", settings)
            .unwrap()
            .load_plugin(Arc::new(Greeter))
            .unwrap()
            .load_plugin(Arc::new(Counter::default()))
            .unwrap();
        let outbox = MemoryOutbox::new();
        let handle = SessionHandle::new("bot", outbox.clone());
        (manager.start().unwrap(), outbox, handle)
    }

    async fn send(fleet: &Fleet, handle: &SessionHandle, data: MessageData) {
        let event = RawMessage::new("alice", handle.thread("t"), data);
        fleet
            .router(None)
            .unwrap()
            .route_and_dispatch(event.into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mention_greets_with_configured_greeting() {
        let (fleet, outbox, handle) = fleet(serde_json::json!({ "greeting": "Howdy" }));
        let data = MessageData::new("m1")
            .with_text("@bot how are you")
            .with_mention(Mention::new("bot", 0, 4));

        send(&fleet, &handle, data).await;

        let sent = outbox.take();
        assert_eq!(sent[0].text, "Howdy (alice)");
    }

    #[tokio::test]
    async fn test_echo_and_count() {
        let (fleet, outbox, handle) = fleet(serde_json::json!({}));

        send(&fleet, &handle, MessageData::new("m1").with_text("hello")).await;
        send(&fleet, &handle, MessageData::new("m2").with_text(".echo  hi there ")).await;
        send(&fleet, &handle, MessageData::new("m3").with_text(".count")).await;

        // The command runs before the tally sees its own message.
        let texts: Vec<String> = outbox.take().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["hi there", "Seen 2 text messages."]);
    }

    #[test]
    fn test_bad_settings_fail_loading() {
        let mut manager = BotManager::new();
        let bot = manager
            .add_bot_with_settings("main", serde_json::json!({ "greeting": 5 }))
            .unwrap();
        assert!(bot.load_plugin(Arc::new(Greeter)).is_err());
    }
}
