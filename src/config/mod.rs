//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and loading
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup validation of loaded values

mod defaults;
mod types;
mod validation;

pub use types::{
    AccountApiConfig, ChannelsConfig, Config, ConfigError, IrcConfig, LogsConfig, OperConfig,
    QueueConfig, StorageBackend, StorageConfig,
};
pub use validation::{ValidationError, validate};
