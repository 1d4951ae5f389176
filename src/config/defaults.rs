//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// IRC Defaults
// =============================================================================

pub fn default_irc_server() -> String {
    "localhost".to_string()
}

pub fn default_irc_port() -> u16 {
    6667
}

pub fn default_bot_name() -> String {
    "renge".to_string()
}

pub fn default_vhost() -> String {
    "bakus.dungeon".to_string()
}

pub fn default_true() -> bool {
    true
}

// =============================================================================
// Oper Defaults
// =============================================================================

pub fn default_oper_username() -> String {
    "oper".to_string()
}

pub fn default_oper_password() -> String {
    "pass".to_string()
}

// =============================================================================
// Channel Defaults
// =============================================================================

pub fn default_staff_channel() -> String {
    "#staff-support".to_string()
}

pub fn default_user_channel() -> String {
    "#user-support".to_string()
}

pub fn default_log_channel() -> String {
    "#support-logging".to_string()
}

pub fn default_session_channels() -> Vec<String> {
    vec!["#support-session1".to_string()]
}

/// Default assumes everyone is staff.
pub fn default_staff_hostmasks() -> Vec<String> {
    vec!["*!*@*".to_string()]
}

// =============================================================================
// Storage / API / Logs Defaults
// =============================================================================

pub fn default_storage_path() -> String {
    "state.redb".to_string()
}

pub fn default_api_url() -> String {
    "https://animebytes.tv".to_string()
}

pub fn default_api_timeout_secs() -> u64 {
    30
}

pub fn default_logs_dir() -> String {
    "logs".to_string()
}

// =============================================================================
// Queue Defaults
// =============================================================================

pub fn default_nag_after_secs() -> u64 {
    300
}

pub fn default_kick_after_secs() -> u64 {
    900
}

pub fn default_join_grace_secs() -> u64 {
    5
}

pub fn default_max_reason_len() -> usize {
    140
}
