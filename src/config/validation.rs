//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use super::StorageBackend;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("irc.nick is required")]
    MissingNick,
    #[error("channels.sessions must list at least one channel")]
    NoSessionChannels,
    #[error("{0} is not a channel name")]
    InvalidChannel(String),
    #[error("{0} is configured more than once")]
    DuplicateChannel(String),
    #[error("storage.path parent directory does not exist: {0}")]
    StoragePathInvalid(String),
}

fn is_channel_name(name: &str) -> bool {
    name.len() > 1 && (name.starts_with('#') || name.starts_with('&')) && !name.contains(' ')
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.irc.nick.is_empty() {
        errors.push(ValidationError::MissingNick);
    }

    if config.channels.sessions.is_empty() {
        errors.push(ValidationError::NoSessionChannels);
    }

    let mut seen = std::collections::HashSet::new();
    let all = config
        .channels
        .main_channels()
        .into_iter()
        .chain(config.channels.sessions.iter().map(String::as_str));
    for channel in all {
        if !is_channel_name(channel) {
            errors.push(ValidationError::InvalidChannel(channel.to_string()));
        }
        if !seen.insert(channel.to_lowercase()) {
            errors.push(ValidationError::DuplicateChannel(channel.to_string()));
        }
    }

    if config.storage.backend == StorageBackend::Redb {
        let path = Path::new(&config.storage.path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::StoragePathInvalid(
                config.storage.path.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
