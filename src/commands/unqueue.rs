//! `!unqueue`: users leave the queue; staff remove by position.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use super::{Commands, capture};
use crate::irc::ChannelMessage;

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!unqueue(?:\s+(\S+))?$").expect("hardcoded regex"));

pub(super) async fn user_unqueue(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "User unqueue request");
    if cmds.queue.unqueue_by_nick(&msg.nick).await.is_err() {
        cmds.reply(&msg, "You're not in the queue!")?;
        return Ok(());
    }
    if let Err(e) = cmds.queue.add_unqueued_user(&msg.nick).await {
        warn!(nick = %msg.nick, error = %e, "Could not start idle timer");
    }
    cmds.reply(&msg, "You've been removed from the queue!")?;
    Ok(())
}

pub(super) async fn staff_unqueue(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff unqueue request");
    let position = capture(&PATTERN, &msg.text, 1)
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|&p| p > 0);
    let Some(position) = position else {
        cmds.reply(&msg, "Please provide a valid position number to unqueue")?;
        return Ok(());
    };

    match cmds.queue.unqueue_by_position(position - 1).await {
        Ok(user) => {
            if let Err(e) = cmds.queue.add_unqueued_user(&user.nick).await {
                warn!(nick = %user.nick, error = %e, "Could not start idle timer");
            }
            cmds.reply(&msg, &format!("Removed {} from the queue", user.nick))?;
        }
        Err(e) => cmds.reply(&msg, &e.chat_message())?,
    }
    Ok(())
}
