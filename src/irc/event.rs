//! Typed events at the transport boundary and at the facade boundary.

use std::fmt;

/// Raw events produced by a [`Transport`](super::Transport).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The server accepted our registration (RPL_WELCOME).
    Registered { nick: String },
    /// The connection is gone.
    Closed,
    /// A numeric reply the transport does not consume itself.
    Numeric { code: u16, params: Vec<String> },
    Join { channel: String, nick: String },
    Part { channel: String, nick: String },
    Kick { channel: String, nick: String },
    Quit { nick: String },
    Nick { old: String, new: String },
    /// Full roster of a channel, sent once a join completes.
    UserList { channel: String, nicks: Vec<String> },
    Message {
        nick: String,
        ident: String,
        hostname: String,
        target: String,
        text: String,
    },
}

/// How a user left a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveKind {
    Kicked,
    Parted,
    Quit,
}

impl fmt::Display for LeaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeaveKind::Kicked => "kicked",
            LeaveKind::Parted => "parted",
            LeaveKind::Quit => "quit",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserJoined {
    pub channel: String,
    pub nick: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserLeft {
    pub channel: String,
    pub nick: String,
    pub kind: LeaveKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NickChanged {
    pub old: String,
    pub new: String,
}

/// A PRIVMSG seen in a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub nick: String,
    pub ident: String,
    pub hostname: String,
    pub text: String,
}

/// One row of a WHO reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhoUser {
    pub nick: String,
    pub ident: String,
    pub hostname: String,
    /// Channel mode letters (`o`, `v`, ...) derived from the WHO flags.
    pub channel_modes: Vec<char>,
}

/// Result of a WHOIS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhoisUser {
    pub nick: String,
    pub ident: String,
    pub hostname: String,
    pub actual_ip: Option<String>,
}

/// Internal notifications published after membership has been updated.
///
/// Used to resolve forced joins.
#[derive(Clone, Debug)]
pub(crate) enum Tap {
    UserList { channel: String },
    Join { channel: String, nick: String },
}
