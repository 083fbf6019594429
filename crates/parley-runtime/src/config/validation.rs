//! Configuration validation utilities.

use std::collections::{HashMap, HashSet};

use parley_core::DispatchSettings;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogLevel, LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(config)?;
    validate_session_config(config)?;
    validate_bots_config(&config.bots)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    for (target, level) in &logging.filters {
        if target.is_empty() {
            return Err(ConfigError::validation("Log filter target cannot be empty"));
        }
        let level = level.to_lowercase();
        if level != "off" && !LogLevel::NAMES.contains(&level.as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level for {target}: {level}. Valid values are: {:?}",
                LogLevel::NAMES
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

/// Validates dispatch settings.
fn validate_dispatch_config(config: &ParleyConfig) -> ConfigResult<()> {
    let min = DispatchSettings::PIPELINE_DEPTH;
    if config.dispatch.max_depth < min {
        return Err(ConfigError::validation(format!(
            "Dispatch max_depth must be at least {min}, the depth at which mention commands are dispatched (got {})",
            config.dispatch.max_depth
        )));
    }
    Ok(())
}

/// Validates session persistence settings.
fn validate_session_config(config: &ParleyConfig) -> ConfigResult<()> {
    if config.session.persist && config.session.file.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("session.file"));
    }
    Ok(())
}

/// Validates all bot configurations.
fn validate_bots_config(bots: &[BotConfig]) -> ConfigResult<()> {
    let mut seen_names = HashSet::new();
    let mut owners: HashMap<&str, &str> = HashMap::new();

    for bot in bots {
        validate_bot_config(bot)?;

        if !seen_names.insert(bot.name.as_str()) {
            return Err(ConfigError::DuplicateBotName(bot.name.clone()));
        }

        for thread in &bot.threads {
            match owners.get(thread.as_str()) {
                Some(first) if *first != bot.name => {
                    return Err(ConfigError::DuplicateThread {
                        thread: thread.clone(),
                        first: first.to_string(),
                        second: bot.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    owners.insert(thread.as_str(), bot.name.as_str());
                }
            }
        }
    }

    Ok(())
}

/// Validates a single bot configuration.
fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.name.trim().is_empty() {
        return Err(ConfigError::missing_field("bots.name"));
    }

    if bot.threads.iter().any(|thread| thread.is_empty()) {
        return Err(ConfigError::validation(format!(
            "Bot {} lists an empty thread id",
            bot.name
        )));
    }

    Ok(())
}
