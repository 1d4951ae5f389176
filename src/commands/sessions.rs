//! `!sessions`: list active support sessions.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::Commands;
use crate::irc::ChannelMessage;
use crate::irc::format::{colored, friendly_date, space};

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!sessions$").expect("hardcoded regex"));

pub(super) async fn staff_sessions(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff sessions request");
    let sessions = cmds.sessions.active_sessions();
    if sessions.is_empty() {
        cmds.reply(&msg, "No active sessions")?;
        return Ok(());
    }
    let lines: Vec<String> = sessions
        .iter()
        .map(|s| {
            format!(
                "{} - {} helping {} started {} reason: {}",
                colored(s.color(), s.channel()),
                space(&s.staff()),
                s.user(),
                friendly_date(s.start_time()),
                s.reason()
            )
        })
        .collect();
    cmds.reply(&msg, &lines.join("\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::irc::format::{colored, friendly_date, space};
    use crate::testing::Harness;

    #[tokio::test(start_paused = true)]
    async fn test_no_sessions() {
        let h = Harness::new().await;
        h.staff_says("mod", "!sessions").await;
        h.staff_says("mod", "!sessions please").await;
        assert_eq!(h.replies("#staff-support"), vec!["No active sessions"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lists_sessions_in_pool_order() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue one").await;
        h.user_says("bob", "!queue two").await;
        h.staff_says("mod", "!handle").await;
        h.staff_says("mod", "!handle").await;
        h.mock.clear_sent();
        h.staff_says("mod", "!SESSIONS").await;

        let expected: Vec<String> = h
            .bot
            .sessions()
            .active_sessions()
            .iter()
            .map(|s| {
                format!(
                    "{} - {} helping {} started {} reason: {}",
                    colored(s.color(), s.channel()),
                    space("mod"),
                    s.user(),
                    friendly_date(s.start_time()),
                    s.reason()
                )
            })
            .collect();
        assert_eq!(expected.len(), 2);
        assert!(expected[0].contains("#s1\x03 - "));
        assert!(expected[0].contains(" helping alice started "));
        assert!(expected[1].ends_with("reason: two"));
        assert_eq!(h.replies("#staff-support"), expected);
    }
}
