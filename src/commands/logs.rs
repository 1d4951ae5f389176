//! `!logs`: links to recently archived transcripts.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::Commands;
use crate::irc::ChannelMessage;
use crate::irc::format::{friendly_date, space};

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!logs").expect("hardcoded regex"));

pub(super) async fn staff_logs(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff logs request");
    let entries = cmds.sessions.context().history.entries();
    if entries.is_empty() {
        cmds.reply(&msg, "No previous logs found!")?;
        return Ok(());
    }
    let lines: Vec<String> = entries
        .iter()
        .enumerate()
        .map(|(i, log)| {
            format!(
                "{}. Conversation between {} and {} at {}: {}",
                i + 1,
                log.user,
                space(&log.staff),
                friendly_date(log.time),
                log.paste
            )
        })
        .collect();
    cmds.reply(&msg, &lines.join("\n"))?;
    Ok(())
}
