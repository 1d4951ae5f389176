//! Unified error handling for deskbot.
//!
//! Each component owns one error enum. Domain errors carry messages that are
//! safe to relay to chat verbatim; everything else is logged server-side and
//! collapsed to [`INTERNAL_ERROR`] at the chat boundary.

use thiserror::Error;

/// The only text an unexpected failure is allowed to show in chat.
pub const INTERNAL_ERROR: &str = "Internal Error";

// ============================================================================
// IRC Errors (transport facade)
// ============================================================================

/// Errors raised by the IRC client facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrcError {
    #[error("IRC bot is not yet registered!")]
    NotRegistered,

    #[error("Unable to join channel {0}")]
    ChannelJoinTimeout(String),

    #[error("Unable to SAJOIN {nick} to {channel}")]
    UserJoinTimeout { channel: String, nick: String },

    #[error("Should not be using join_user_to_channel with self")]
    JoinSelf,

    #[error("Cannot join user to channel {0} which I am not currently in")]
    NotInChannel(String),

    #[error("WHO {0} took too long, maybe room is empty?")]
    WhoTimeout(String),

    #[error("WHOIS {0} took too long, nick is probably offline")]
    WhoisTimeout(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl IrcError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::ChannelJoinTimeout(_) => "channel_join_timeout",
            Self::UserJoinTimeout { .. } => "user_join_timeout",
            Self::JoinSelf => "join_self",
            Self::NotInChannel(_) => "not_in_channel",
            Self::WhoTimeout(_) => "who_timeout",
            Self::WhoisTimeout(_) => "whois_timeout",
            Self::Transport(_) => "transport",
        }
    }
}

/// Errors raised by a [`Transport`](crate::irc::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed before a reply arrived")]
    Closed,

    #[error("no such nick/channel: {0}")]
    NoSuchTarget(String),

    #[error("connect failed: {0}")]
    Connect(String),
}

// ============================================================================
// Storage Errors
// ============================================================================

/// Durable store errors.
///
/// `NotFound` is distinguished from every other failure: callers treat it as
/// "start from empty" while everything else propagates.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// Queue Errors
// ============================================================================

/// Support queue errors. Display text is relayed to chat as-is.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("No users are in the queue!")]
    Empty,

    #[error("Only {0} {verb} in the queue!", verb = users_are(.0))]
    OutOfRange(usize),

    #[error("{0} is not in the queue!")]
    NotQueued(String),

    #[error("{0}")]
    Irc(#[from] IrcError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

fn users_are(count: &usize) -> &'static str {
    if *count == 1 { "user is" } else { "users are" }
}

impl QueueError {
    /// Text suitable for a chat reply.
    ///
    /// Domain errors are shown verbatim; IRC and storage failures are not.
    pub fn chat_message(&self) -> String {
        match self {
            Self::Empty | Self::OutOfRange(_) | Self::NotQueued(_) => self.to_string(),
            Self::Irc(_) | Self::Store(_) => INTERNAL_ERROR.to_string(),
        }
    }
}

// ============================================================================
// Session Errors
// ============================================================================

/// Session and session manager errors. Display text is chat-safe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("All available support channels are in use!")]
    ChannelsExhausted,

    #[error("Internal Error")]
    Internal,
}

// ============================================================================
// Account API Errors
// ============================================================================

/// Errors from the external account-management API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Received HTTP {status} from call to {path}")]
    Status { status: u16, path: String },

    #[error("Error creating paste: {0}")]
    Paste(String),
}
