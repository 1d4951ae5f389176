//! `!kill`: end a session by channel name.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::{Commands, capture};
use crate::irc::ChannelMessage;

pub(super) static PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^!kill\s+(.*)").expect("hardcoded regex"));

pub(super) async fn staff_kill(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff kill request");
    let channel = capture(&PATTERN, &msg.text, 1).unwrap_or("");
    if cmds.sessions.end_session_in(channel).await {
        info!(channel = %channel, staff = %msg.nick, "Session killed");
        cmds.reply(&msg, &format!("{channel} session has been ended"))?;
    } else {
        cmds.reply(&msg, &format!("{channel} is not a valid active session!"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;

    #[tokio::test(start_paused = true)]
    async fn test_kill_unknown_channel() {
        let h = Harness::new().await;
        h.staff_says("mod", "!kill #s1").await;
        h.staff_says("mod", "!kill #nowhere").await;
        assert_eq!(
            h.replies("#staff-support"),
            vec![
                "#s1 is not a valid active session!",
                "#nowhere is not a valid active session!",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_ends_and_archives() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue help").await;
        h.staff_says("mod", "!handle").await;
        h.mock.clear_sent();

        h.staff_says("mod", "!kill #S1").await;
        assert_eq!(h.replies("#staff-support"), vec!["#S1 session has been ended"]);
        assert!(h.bot.sessions().active_sessions().is_empty());
        assert_eq!(h.api.paste_count(), 1);
        assert_eq!(h.bot.sessions().context().history.entries().len(), 1);
        assert!(h.mock.sent().contains(&"SAPART alice #s1".to_string()));

        h.staff_says("mod", "!kill #s1").await;
        assert_eq!(
            h.replies("#staff-support").last().map(String::as_str),
            Some("#s1 is not a valid active session!")
        );
        assert_eq!(h.api.paste_count(), 1);
    }
}
