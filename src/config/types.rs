//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// IRC connection settings.
    #[serde(default)]
    pub irc: IrcConfig,
    /// Operator credentials used for privilege escalation.
    #[serde(default)]
    pub oper: OperConfig,
    /// Main channels and the session channel pool.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Durable state storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// External account-management API.
    #[serde(default)]
    pub account_api: AccountApiConfig,
    /// Local transcript storage.
    #[serde(default)]
    pub logs: LogsConfig,
    /// Queue idle policy.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file cannot be read.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::Io(e)) => {
                tracing::error!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "Error reading config file, proceeding with defaults"
                );
                Ok(Self::default())
            }
            other => other,
        }
    }
}

/// IRC connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IrcConfig {
    /// Server hostname.
    #[serde(default = "default_irc_server")]
    pub server: String,
    /// Server port.
    #[serde(default = "default_irc_port")]
    pub port: u16,
    /// Connect with TLS.
    #[serde(default)]
    pub use_tls: bool,
    /// Verify the server certificate when using TLS.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Bot nickname.
    #[serde(default = "default_bot_name")]
    pub nick: String,
    /// Bot ident.
    #[serde(default = "default_bot_name")]
    pub username: String,
    /// Bot realname (GECOS).
    #[serde(default = "default_bot_name")]
    pub realname: String,
    /// Host set with CHGHOST after gaining oper.
    #[serde(default = "default_vhost")]
    pub vhost: String,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_irc_server(),
            port: default_irc_port(),
            use_tls: false,
            verify_tls: true,
            nick: default_bot_name(),
            username: default_bot_name(),
            realname: default_bot_name(),
            vhost: default_vhost(),
        }
    }
}

/// Operator block credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct OperConfig {
    #[serde(default = "default_oper_username")]
    pub username: String,
    #[serde(default = "default_oper_password")]
    pub password: String,
}

impl Default for OperConfig {
    fn default() -> Self {
        Self {
            username: default_oper_username(),
            password: default_oper_password(),
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Staff-only channel where staff commands are accepted.
    #[serde(default = "default_staff_channel")]
    pub staff: String,
    /// Public channel users queue in.
    #[serde(default = "default_user_channel")]
    pub user: String,
    /// Channel transcripts are relayed to.
    #[serde(default = "default_log_channel")]
    pub log: String,
    /// Pool of ephemeral one-on-one channels.
    #[serde(default = "default_session_channels")]
    pub sessions: Vec<String>,
    /// Hostmasks (`nick!ident@host`) identifying staff.
    #[serde(default = "default_staff_hostmasks")]
    pub staff_hostmasks: Vec<String>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            staff: default_staff_channel(),
            user: default_user_channel(),
            log: default_log_channel(),
            sessions: default_session_channels(),
            staff_hostmasks: default_staff_hostmasks(),
        }
    }
}

impl ChannelsConfig {
    /// The channels the bot always sits in: staff, user support and log.
    pub fn main_channels(&self) -> [&str; 3] {
        [&self.staff, &self.user, &self.log]
    }

    /// Whether the bot should always be present in `channel`.
    pub fn is_managed(&self, channel: &str) -> bool {
        self.main_channels()
            .into_iter()
            .chain(self.sessions.iter().map(String::as_str))
            .any(|c| c.eq_ignore_ascii_case(channel))
    }

    pub fn is_session_channel(&self, channel: &str) -> bool {
        self.sessions.iter().any(|c| c.eq_ignore_ascii_case(channel))
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redb,
    Memory,
}

/// Durable state configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Path to the redb database file.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

/// Account API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountApiConfig {
    /// Base URL of the site.
    #[serde(default = "default_api_url")]
    pub url: String,
    /// Site API key, sent as the `authKey` query parameter.
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AccountApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            api_key: String::new(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

/// Local transcript storage.
#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

/// Idle policy for users sitting in the support channel without queuing.
///
/// - `nag_after_secs`: delay before the "please queue" nag (default: 300)
/// - `kick_after_secs`: delay after the nag before the kick (default: 900)
/// - `join_grace_secs`: wait after a join before checking op status (default: 5)
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_nag_after_secs")]
    pub nag_after_secs: u64,
    #[serde(default = "default_kick_after_secs")]
    pub kick_after_secs: u64,
    #[serde(default = "default_join_grace_secs")]
    pub join_grace_secs: u64,
    /// Longest accepted `!queue` reason.
    #[serde(default = "default_max_reason_len")]
    pub max_reason_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            nag_after_secs: default_nag_after_secs(),
            kick_after_secs: default_kick_after_secs(),
            join_grace_secs: default_join_grace_secs(),
            max_reason_len: default_max_reason_len(),
        }
    }
}

impl QueueConfig {
    pub fn nag_after(&self) -> Duration {
        Duration::from_secs(self.nag_after_secs)
    }

    pub fn kick_after(&self) -> Duration {
        Duration::from_secs(self.kick_after_secs)
    }

    pub fn join_grace(&self) -> Duration {
        Duration::from_secs(self.join_grace_secs)
    }
}
