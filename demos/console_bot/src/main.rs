//! Console Bot Example
//!
//! Drives a Parley fleet from stdin. Bots and their threads come from
//! `parley.toml` (or the file given with `--config`); without any configured
//! bot a single fallback bot named `main` is created. Every bot gets the
//! `greeter` and `counter` plugins.
//!
//! ```toml
//! [logging]
//! output = "stderr"
//!
//! [[bots]]
//! name = "support"
//! threads = ["123"]
//! settings = { greeting = "How can I help?" }
//!
//! [[bots]]
//! name = "main"
//! ```
//!
//! # Usage
//!
//! ```bash
//! echo '.help' | cargo run --package console-bot
//! cargo run --package console-bot -- --config parley.toml --target support
//! ```
//!
//! See [`console`] for the input line format.

mod console;
mod plugins;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley::prelude::*;
use parley::runtime::config::{LogOutput, LoggingConfig};

use crate::console::{ConsoleConnector, ConsoleOutbox};
use crate::plugins::{Counter, Greeter};

#[derive(Debug, Parser)]
#[command(name = "console-bot", about = "Drive a Parley fleet from stdin")]
struct Args {
    /// Configuration file. Searched for in the current directory when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,

    /// Deliver events to this bot only.
    #[arg(short, long)]
    target: Option<String>,

    /// User id of the session. Mentions of this id address the bots.
    #[arg(long, default_value = "bot")]
    user_id: String,

    /// Neither load nor save session credentials.
    #[arg(long)]
    no_persist: bool,
}

/// Logs go to stderr so that replies on stdout stay readable.
fn defaults() -> ParleyConfig {
    ParleyConfig {
        logging: LoggingConfig {
            output: LogOutput::Stderr,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ParleyRuntime::builder().merge(defaults());
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }
    let mut runtime = builder.build().context("failed to start runtime")?;

    if runtime.manager().bots().is_empty() {
        runtime.manager_mut().add_bot("main")?;
    }

    let names: Vec<String> = runtime
        .manager()
        .bots()
        .iter()
        .map(|bot| bot.name().to_string())
        .collect();
    for name in &names {
        let Some(bot) = runtime.bot_mut(name) else {
            continue;
        };
        bot.load_plugin(Arc::new(Greeter))
            .and_then(|bot| bot.load_plugin(Arc::new(Counter::default())))
            .with_context(|| format!("failed to load plugins into {name}"))?;
    }

    if args.no_persist {
        runtime = runtime.without_store();
    }
    if let Some(target) = args.target {
        runtime = runtime.target(target);
    }

    let connector = ConsoleConnector::new(args.user_id, Arc::new(ConsoleOutbox::default()));
    let stats = runtime.run(&connector).await?;

    info!(
        origin = ?stats.origin,
        events = stats.events,
        deliveries = stats.deliveries,
        "Console session finished"
    );
    Ok(())
}
