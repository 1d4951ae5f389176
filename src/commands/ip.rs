//! `!ip`: look up the address of a queued or in-session user.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error};

use super::{Commands, capture};
use crate::irc::ChannelMessage;
use crate::queue::UNAVAILABLE_IP;

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!ip\s+(\S+)$").expect("hardcoded regex"));

pub(super) async fn staff_ip(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff IP request");
    let Some(nick) = capture(&PATTERN, &msg.text, 1) else {
        return Ok(());
    };
    if !cmds.sessions.is_user_in_session(nick) && !cmds.queue.is_in_queue(nick) {
        cmds.reply(
            &msg,
            &format!("{nick} is not in the queue nor in an active session!"),
        )?;
        return Ok(());
    }

    match cmds.irc.whois(nick).await {
        Ok(user) => {
            let ip = user.actual_ip.as_deref().unwrap_or(UNAVAILABLE_IP);
            cmds.irc.notice(&msg.nick, &format!("{nick}'s IP is {ip}"))?;
        }
        Err(e) => {
            error!(nick = %nick, error = %e, "IP lookup failed");
            cmds.reply(&msg, "An internal error has occured, please notify sysop")?;
        }
    }
    Ok(())
}
