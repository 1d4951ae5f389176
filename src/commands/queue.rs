//! `!queue`: users join the queue; staff list it.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, warn};

use super::{Commands, capture};
use crate::error::{INTERNAL_ERROR, IrcError};
use crate::irc::ChannelMessage;
use crate::irc::format::minutes_to_string;
use crate::queue::QueuedUser;

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!queue(?:\s*(.*))?").expect("hardcoded regex"));

const HELP: &str = "If you need your account re-enabled please type !reenable <your username>. \
                    Otherwise please enter the support queue with !queue <reason you need assistance>.";

pub(super) async fn user_queue(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    match exempt_from_queue(&cmds, &msg.nick).await {
        Ok(true) => return Ok(()),
        Ok(false) => {}
        Err(e) => {
            warn!(nick = %msg.nick, error = %e, "Could not check whether user may queue");
            cmds.reply(&msg, INTERNAL_ERROR)?;
            return Ok(());
        }
    }
    debug!(nick = %msg.nick, "User queue request");

    let reason = capture(&PATTERN, &msg.text, 1).unwrap_or("");
    if reason.is_empty() {
        cmds.reply(&msg, HELP)?;
        return Ok(());
    }
    if reason.chars().count() > cmds.max_reason_len {
        cmds.reply(
            &msg,
            &format!(
                "Sorry, your reason is a bit too long. Mind cutting it down to {} characters and trying again?",
                cmds.max_reason_len
            ),
        )?;
        return Ok(());
    }

    let text = match cmds.queue.queue_user(&msg.nick, reason).await {
        Ok(true) => "You've been added to the queue!",
        Ok(false) => {
            "You're already in the queue! If you'd like to leave just type !unqueue or part the channel."
        }
        Err(e) => {
            error!(nick = %msg.nick, error = %e, "Error queuing user");
            INTERNAL_ERROR
        }
    };
    cmds.reply(&msg, text)?;
    Ok(())
}

/// Staff and channel operators never queue.
async fn exempt_from_queue(cmds: &Commands, nick: &str) -> Result<bool, IrcError> {
    let user_channel = &cmds.irc.channels().user;
    Ok(cmds.irc.is_staff(nick).await? || cmds.irc.is_channel_op(user_channel, nick).await?)
}

pub(super) async fn staff_queue(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    let users = cmds.queue.snapshot();
    if users.is_empty() {
        cmds.reply(&msg, "No users are queued!")?;
        return Ok(());
    }
    let now = Utc::now();
    let lines: Vec<String> = users
        .iter()
        .enumerate()
        .map(|(i, user)| queue_line(i + 1, user, now))
        .collect();
    cmds.reply(&msg, &lines.join("\n"))?;
    Ok(())
}

/// `2. bob - my reason - 5 minutes ago`
fn queue_line(position: usize, user: &QueuedUser, now: DateTime<Utc>) -> String {
    let minutes = (now - user.time).num_minutes();
    let age = if minutes > 0 {
        format!("{} ago", minutes_to_string(minutes))
    } else {
        "just now".to_string()
    };
    if user.reason.is_empty() {
        format!("{position}. {} - {age}", user.nick)
    } else {
        format!("{position}. {} - {} - {age}", user.nick, user.reason)
    }
}
