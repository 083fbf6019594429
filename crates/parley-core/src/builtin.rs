//! Built-in command router and commands.

use std::sync::Arc;

use tracing::{debug, error};

use crate::bot::FaultPolicy;
use crate::command::Command;
use crate::error::{DispatchError, RegistrationResult, SendResult};
use crate::event::CommandEvent;
use crate::handler::BotRef;
use crate::listener::Listener;

/// The listener that runs commands. Registered first on every bot.
pub(crate) fn command_router() -> RegistrationResult<Listener> {
    Listener::on::<CommandEvent>()
        .name("command_router")
        .handler_with_bot(route_command)
        .build()
}

async fn route_command(event: Arc<CommandEvent>, bot: BotRef) -> crate::DispatchResult {
    let entries = bot.registry().commands(&event.name);
    debug!(command = %event.name, handlers = entries.len(), "Routing command");

    for entry in entries {
        let Err(error) = entry.item.handler().call(Arc::clone(&event), &bot).await else {
            continue;
        };
        let error = DispatchError::from_command(&event.name, &entry.source, error);
        match bot.dispatch_settings().fault_policy {
            FaultPolicy::Propagate => return Err(error),
            FaultPolicy::Isolate => error!(
                command = %event.name,
                source = %entry.source,
                error = %error,
                "Command failed, continuing"
            ),
        }
    }
    Ok(())
}

pub(crate) fn core_commands() -> RegistrationResult<Vec<Command>> {
    Ok(vec![
        Command::new("help")
            .doc("Show all commands, or use '.help <cmd>' to show help for the command with name <cmd>.")
            .handler_with_bot(help)
            .build()?,
        Command::new("ping")
            .doc("Ping the bot. Useful to see if it's working.")
            .handler(ping)
            .build()?,
    ])
}

async fn help(event: Arc<CommandEvent>, bot: BotRef) -> SendResult<()> {
    let filter = Some(event.body.as_str()).filter(|name| !name.is_empty());

    let mut reply: String = bot
        .get_all_commands(filter)
        .iter()
        .map(|doc| format!("*{}*\n{}\n", doc.name, doc.doc))
        .collect();
    if reply.is_empty() {
        reply = format!("No command found with name *{}*.", event.body);
    }

    event.thread.send_text(&reply).await.map(drop)
}

async fn ping(event: Arc<CommandEvent>) -> SendResult<()> {
    event.thread.send_text("PONG").await.map(drop)
}
