//! The derivation pipeline.
//!
//! These listeners turn raw session events into semantic ones by dispatching
//! derived events back through the bot. They are registered in this order on
//! every bot:
//!
//! 1. raw message → message, unless the session user wrote it
//! 2. raw reply → message with `replied_to`, same rule
//! 3. message → text, sticker, image or other message (first match wins)
//! 4. text → mention, for each leading mention of the session user
//! 5. mention → command, from the text after the mention
//! 6. text → command, for text starting with `.`
//! 7. raw reaction → reaction, stamped with the processing time
//!
//! Steps 5 and 6 are independent: a message can yield two commands.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::RegistrationResult;
use crate::event::{
    CommandEvent, Event, ImageMessage, MentionEvent, MessageEnvelope, MessageEvent, OtherMessage,
    RawMessage, RawMessageReply, RawReaction, ReactionEvent, StickerMessage, TextMessage,
};
use crate::handler::BotRef;
use crate::listener::Listener;
use crate::message::Mention;
use crate::session::ThreadRef;

/// Prefix that marks a text message as a command.
pub const COMMAND_PREFIX: char = '.';

pub(crate) fn core_listeners() -> RegistrationResult<Vec<Listener>> {
    Ok(vec![
        Listener::on::<RawMessage>()
            .name("raw_message_to_message")
            .handler_with_bot(raw_message_to_message)
            .build()?,
        Listener::on::<RawMessageReply>()
            .name("raw_reply_to_message")
            .handler_with_bot(raw_reply_to_message)
            .build()?,
        Listener::on::<MessageEvent>()
            .name("classify_message")
            .handler_with_bot(classify_message)
            .build()?,
        Listener::on::<TextMessage>()
            .name("text_to_mention")
            .handler_with_bot(text_to_mention)
            .build()?,
        Listener::on::<MentionEvent>()
            .name("mention_to_command")
            .handler_with_bot(mention_to_command)
            .build()?,
        Listener::on::<TextMessage>()
            .name("prefixed_text_to_command")
            .handler_with_bot(prefixed_text_to_command)
            .build()?,
        Listener::on::<RawReaction>()
            .name("raw_reaction_to_reaction")
            .handler_with_bot(raw_reaction_to_reaction)
            .build()?,
    ])
}

// =============================================================================
// Listeners
// =============================================================================

async fn raw_message_to_message(raw: Arc<RawMessage>, bot: BotRef) -> crate::DispatchResult {
    if is_from_self(&raw.author, &raw.thread) {
        return Ok(());
    }
    let envelope = MessageEnvelope {
        author: raw.author.clone(),
        thread: raw.thread.clone(),
        message: Arc::clone(&raw.message),
        at: raw.at,
        replied_to: None,
    };
    bot.dispatch(MessageEvent { envelope }).await
}

async fn raw_reply_to_message(raw: Arc<RawMessageReply>, bot: BotRef) -> crate::DispatchResult {
    if is_from_self(&raw.author, &raw.thread) {
        return Ok(());
    }
    let envelope = MessageEnvelope {
        author: raw.author.clone(),
        thread: raw.thread.clone(),
        message: Arc::clone(&raw.message),
        at: raw.at(),
        replied_to: raw.replied_to.clone(),
    };
    bot.dispatch(MessageEvent { envelope }).await
}

async fn classify_message(message: Arc<MessageEvent>, bot: BotRef) -> crate::DispatchResult {
    bot.dispatch(classify(&message.envelope)).await
}

async fn text_to_mention(text: Arc<TextMessage>, bot: BotRef) -> crate::DispatchResult {
    let user_id = text.thread.session().user_id();
    let leading = text
        .message
        .mentions
        .iter()
        .filter(|mention| mention.target_id == user_id && mention.offset == 0);

    for mention in leading {
        let event = MentionEvent {
            envelope: text.envelope.clone(),
            mention: mention.clone(),
        };
        bot.dispatch(event).await?;
    }
    Ok(())
}

async fn mention_to_command(mention: Arc<MentionEvent>, bot: BotRef) -> crate::DispatchResult {
    let remainder = strip_span(mention.message.text(), &mention.mention);
    let Some((name, body)) = split_command(remainder.trim()) else {
        return Ok(());
    };
    let event = CommandEvent {
        envelope: mention.envelope.clone(),
        name,
        body,
    };
    bot.dispatch(event).await
}

async fn prefixed_text_to_command(text: Arc<TextMessage>, bot: BotRef) -> crate::DispatchResult {
    let Some(rest) = text.text.strip_prefix(COMMAND_PREFIX) else {
        return Ok(());
    };
    let Some((name, body)) = split_command(rest) else {
        return Ok(());
    };
    let event = CommandEvent {
        envelope: text.envelope.clone(),
        name,
        body,
    };
    bot.dispatch(event).await
}

async fn raw_reaction_to_reaction(raw: Arc<RawReaction>, bot: BotRef) -> crate::DispatchResult {
    let event = ReactionEvent {
        author: raw.author.clone(),
        thread: raw.thread.clone(),
        reaction: raw.reaction.clone(),
        observed_at: OffsetDateTime::now_utc(),
    };
    bot.dispatch(event).await
}

// =============================================================================
// Helpers
// =============================================================================

fn is_from_self(author: &str, thread: &ThreadRef) -> bool {
    author == thread.session().user_id()
}

/// Picks the message subtype. Text wins over sticker, sticker over images.
fn classify(envelope: &MessageEnvelope) -> Event {
    let data = Arc::clone(&envelope.message);
    let envelope = envelope.clone();

    if let Some(text) = data.text.as_deref().filter(|text| !text.is_empty()) {
        return TextMessage {
            envelope,
            text: text.to_string(),
        }
        .into();
    }
    if let Some(sticker) = &data.sticker {
        return StickerMessage {
            envelope,
            sticker: sticker.clone(),
        }
        .into();
    }
    let images: Vec<_> = data.images().cloned().collect();
    if !images.is_empty() {
        return ImageMessage { envelope, images }.into();
    }
    OtherMessage { envelope }.into()
}

/// Removes the mention's character span from `text`.
fn strip_span(text: &str, mention: &Mention) -> String {
    text.chars()
        .enumerate()
        .filter(|(index, _)| *index < mention.offset || *index >= mention.offset + mention.length)
        .map(|(_, c)| c)
        .collect()
}

/// Splits `input` at its first whitespace into a name and a trimmed body.
///
/// Returns `None` when the name would be empty.
fn split_command(input: &str) -> Option<(String, String)> {
    let (name, body) = input
        .split_once(char::is_whitespace)
        .unwrap_or((input, ""));
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), body.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::bot::Bot;
    use crate::event::{EmojiMessage, EventKind, EventVariant};
    use crate::message::{Attachment, ImageAttachment, MessageData, ReactionData, Sticker};
    use crate::router::BotManager;
    use crate::session::{MemoryOutbox, SessionHandle};

    const ME: &str = "me";

    /// Starts a bot that records every event of the listed kinds.
    fn recording_bot(kinds: &[EventKind]) -> (Arc<Bot>, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut manager = BotManager::new();
        let bot = manager.add_bot("recorder").unwrap();
        for kind in kinds {
            let seen = Arc::clone(&seen);
            let listener = Listener::any()
                .kind(*kind)
                .handler(move |event: Event| {
                    seen.lock().push(event);
                    async {}
                })
                .build()
                .unwrap();
            bot.add_listener(listener, "test");
        }
        let id = bot.id();
        let fleet = manager.start().unwrap();
        (fleet.bot(id).unwrap().clone(), seen)
    }

    fn thread() -> ThreadRef {
        SessionHandle::new(ME, MemoryOutbox::new()).thread("t1")
    }

    fn raw(author: &str, data: MessageData) -> RawMessage {
        RawMessage::new(author, thread(), data)
    }

    fn commands(seen: &[Event]) -> Vec<(String, String)> {
        seen.iter()
            .filter_map(CommandEvent::extract)
            .map(|cmd| (cmd.name.clone(), cmd.body.clone()))
            .collect()
    }

    fn cmd(name: &str, body: &str) -> (String, String) {
        (name.to_string(), body.to_string())
    }

    fn kinds(seen: &[Event]) -> Vec<EventKind> {
        seen.iter().map(Event::kind).collect()
    }

    #[tokio::test]
    async fn test_self_authored_messages_are_dropped() {
        let (bot, seen) = recording_bot(&[EventKind::Message]);

        bot.dispatch(raw(ME, MessageData::new("m1").with_text("hi"))).await.unwrap();
        let reply = RawMessageReply::new(ME, thread(), MessageData::new("m2").with_text("hi"), None);
        bot.dispatch(reply).await.unwrap();

        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reply_carries_replied_to() {
        let (bot, seen) = recording_bot(&[EventKind::Message]);
        let original = MessageData::new("m0").with_text("question");
        let reply = RawMessageReply::new("u1", thread(), MessageData::new("m1").with_text("answer"), Some(original));

        bot.dispatch(reply).await.unwrap();

        let seen = seen.lock();
        let message = MessageEvent::extract(&seen[0]).unwrap();
        assert_eq!(message.replied_to.as_ref().map(|m| m.id.as_str()), Some("m0"));
        assert_eq!(message.at, message.message.created_at);
    }

    #[tokio::test]
    async fn test_classification_order() {
        let (bot, seen) = recording_bot(&[
            EventKind::TextMessage,
            EventKind::StickerMessage,
            EventKind::ImageMessage,
            EventKind::EmojiMessage,
            EventKind::OtherMessage,
        ]);
        let sticker = Sticker {
            id: "s1".into(),
            label: None,
        };
        let image = Attachment::Image(ImageAttachment {
            id: "i1".into(),
            url: None,
            animated: false,
        });

        let text_and_sticker = MessageData::new("m1").with_text("hi").with_sticker(sticker.clone());
        let empty_text_sticker = MessageData::new("m2").with_text("").with_sticker(sticker);
        let images = MessageData::new("m3").with_attachment(image);
        let nothing = MessageData::new("m4");

        for data in [text_and_sticker, empty_text_sticker, images, nothing] {
            bot.dispatch(raw("u1", data)).await.unwrap();
        }

        assert_eq!(
            kinds(&seen.lock()),
            [
                EventKind::TextMessage,
                EventKind::StickerMessage,
                EventKind::ImageMessage,
                EventKind::OtherMessage,
            ]
        );
        assert!(seen.lock().iter().all(|e| EmojiMessage::extract(e).is_none()));
    }

    #[tokio::test]
    async fn test_dot_prefix_emits_command() {
        let (bot, seen) = recording_bot(&[EventKind::Command]);

        bot.dispatch(raw("u1", MessageData::new("m1").with_text(".echo  hello world ")))
            .await
            .unwrap();

        assert_eq!(commands(&seen.lock()), [cmd("echo", "hello world")]);
    }

    #[tokio::test]
    async fn test_dot_with_empty_name_emits_nothing() {
        let (bot, seen) = recording_bot(&[EventKind::Command]);

        for text in [".", ". echo", "plain"] {
            bot.dispatch(raw("u1", MessageData::new("m").with_text(text))).await.unwrap();
        }

        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_leading_mention_emits_command() {
        let (bot, seen) = recording_bot(&[EventKind::Mention, EventKind::Command]);
        let data = MessageData::new("m1")
            .with_text("@Bot help ping")
            .with_mention(Mention::new(ME, 0, 4));

        bot.dispatch(raw("u1", data)).await.unwrap();

        // The core mention listener runs before the recorder and dispatches
        // the command re-entrantly, so the command is recorded first.
        let seen = seen.lock();
        assert_eq!(kinds(&seen), [EventKind::Command, EventKind::Mention]);
        assert_eq!(commands(&seen), [cmd("help", "ping")]);
    }

    #[tokio::test]
    async fn test_mention_span_is_character_based() {
        let (bot, seen) = recording_bot(&[EventKind::Command]);
        let data = MessageData::new("m1")
            .with_text("@Ünïcødé  ping")
            .with_mention(Mention::new(ME, 0, 8));

        bot.dispatch(raw("u1", data)).await.unwrap();

        assert_eq!(commands(&seen.lock()), [cmd("ping", "")]);
    }

    #[tokio::test]
    async fn test_non_leading_or_foreign_mentions_are_ignored() {
        let (bot, seen) = recording_bot(&[EventKind::Mention]);
        let later = MessageData::new("m1")
            .with_text("hey @Bot")
            .with_mention(Mention::new(ME, 4, 4));
        let other = MessageData::new("m2")
            .with_text("@Ann hi")
            .with_mention(Mention::new("ann", 0, 4));

        bot.dispatch(raw("u1", later)).await.unwrap();
        bot.dispatch(raw("u1", other)).await.unwrap();

        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bare_mention_emits_no_command() {
        let (bot, seen) = recording_bot(&[EventKind::Mention, EventKind::Command]);
        let data = MessageData::new("m1")
            .with_text("@Bot   ")
            .with_mention(Mention::new(ME, 0, 4));

        bot.dispatch(raw("u1", data)).await.unwrap();

        assert_eq!(kinds(&seen.lock()), [EventKind::Mention]);
    }

    #[tokio::test]
    async fn test_mention_and_dot_both_fire() {
        let (bot, seen) = recording_bot(&[EventKind::Command]);
        let data = MessageData::new("m1")
            .with_text(".x")
            .with_mention(Mention::new(ME, 0, 0));

        bot.dispatch(raw("u1", data)).await.unwrap();

        assert_eq!(
            commands(&seen.lock()),
            [cmd(".x", ""), cmd("x", "")]
        );
    }

    #[tokio::test]
    async fn test_reaction_is_stamped_at_processing_time() {
        let (bot, seen) = recording_bot(&[EventKind::Reaction]);
        let before = OffsetDateTime::now_utc();
        let reaction = RawReaction {
            author: "u1".into(),
            thread: thread(),
            reaction: ReactionData {
                message_id: "m1".into(),
                reaction: Some("👍".into()),
            },
        };

        bot.dispatch(reaction).await.unwrap();

        let seen = seen.lock();
        let event = ReactionEvent::extract(&seen[0]).unwrap();
        assert!(event.observed_at >= before);
        assert_eq!(event.reaction.reaction.as_deref(), Some("👍"));
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo"), Some(("echo".into(), String::new())));
        assert_eq!(split_command("echo a  b "), Some(("echo".into(), "a  b".into())));
        assert_eq!(split_command(""), None);
        assert_eq!(split_command(" echo"), None);
    }
}
