//! `!handle`: staff take the next user, a queue position, or anyone by nick.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use super::{Commands, capture};
use crate::irc::ChannelMessage;

pub(super) static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^!handle(?:\s*([a-zA-Z0-9_-]+))?(?:\s*(.+))?").expect("hardcoded regex")
});

/// Shown instead of an IP when staff pull in someone who never queued.
const MANUAL_IP: &str = "N/A";

pub(super) async fn staff_handle(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    debug!(nick = %msg.nick, "Staff handle request");
    let target = capture(&PATTERN, &msg.text, 1);
    let reason = capture(&PATTERN, &msg.text, 2);

    if let (Some(user), Some(reason)) = (target, reason) {
        return handle_manual(&cmds, &msg, user, reason).await;
    }

    let position = match target {
        None => Some(1),
        Some(p) => p.parse::<usize>().ok().filter(|&p| p > 0),
    };
    let Some(position) = position else {
        cmds.reply(&msg, "Please provide a valid position number to handle")?;
        return Ok(());
    };

    let user = match cmds.queue.unqueue_by_position(position - 1).await {
        Ok(user) => user,
        Err(e) => {
            cmds.reply(&msg, &e.chat_message())?;
            return Ok(());
        }
    };
    if let Err(e) = cmds
        .sessions
        .start_support_session(&user.nick, &msg.nick, true, &user.reason, &user.ip)
        .await
    {
        cmds.reply(&msg, &e.to_string())?;
    }
    Ok(())
}

async fn handle_manual(
    cmds: &Commands,
    msg: &ChannelMessage,
    user: &str,
    reason: &str,
) -> anyhow::Result<()> {
    if let Err(e) = cmds
        .sessions
        .start_support_session(user, &msg.nick, false, reason, MANUAL_IP)
        .await
    {
        cmds.reply(msg, &e.to_string())?;
        return Ok(());
    }
    if let Err(e) = cmds.queue.unqueue_by_nick_silent(user).await {
        warn!(nick = %user, error = %e, "Failed to unqueue manually handled user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;

    #[tokio::test(start_paused = true)]
    async fn test_handle_next_in_queue() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue locked out").await;
        h.user_says("bob", "!queue me too").await;
        h.staff_says("mod", "!handle").await;

        let sessions = h.bot.sessions().active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].channel(), "#s1");
        assert_eq!(sessions[0].user(), "alice");
        assert_eq!(sessions[0].staff(), "mod");
        assert_eq!(sessions[0].reason(), "locked out");
        assert_eq!(h.bot.queue().next_nick().as_deref(), Some("bob"));
        assert!(
            h.replies("#user-support")
                .contains(&"Now helping alice. Next in queue: bob".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_by_position() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue one").await;
        h.user_says("bob", "!queue two").await;
        h.staff_says("mod", "!handle 2").await;

        let sessions = h.bot.sessions().active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user(), "bob");
        assert_eq!(h.bot.queue().next_nick().as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_handle_skips_queue() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue one").await;
        h.user_says("carol", "!queue two").await;
        h.mock.clear_sent();
        h.staff_says("mod", "!handle carol needs a hand").await;

        let sessions = h.bot.sessions().active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user(), "carol");
        assert_eq!(sessions[0].reason(), "needs a hand");
        assert_eq!(h.bot.queue().snapshot().len(), 1);
        assert_eq!(h.bot.queue().next_nick().as_deref(), Some("alice"));
        assert!(
            h.mock
                .sent()
                .contains(&"NOTICE mod :Starting support session for carol in #s1, user IP: N/A".to_string())
        );
        assert!(h.mock.sent_matching("PRIVMSG #user-support :Now helping").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_out_of_range() {
        let h = Harness::new().await;
        h.user_says("alice", "!queue one").await;
        h.mock.clear_sent();
        h.staff_says("mod", "!handle 4").await;
        assert_eq!(h.replies("#staff-support"), vec!["Only 1 user is in the queue!"]);
        assert_eq!(h.bot.queue().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_empty_and_invalid() {
        let h = Harness::new().await;
        h.staff_says("mod", "!handle").await;
        h.staff_says("mod", "!handle 0").await;
        h.staff_says("mod", "!handle bob").await;
        assert_eq!(
            h.replies("#staff-support"),
            vec![
                "No users are in the queue!",
                "Please provide a valid position number to handle",
                "Please provide a valid position number to handle",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_when_channels_exhausted() {
        let h = Harness::new().await;
        for nick in ["u1", "u2", "u3"] {
            h.user_says(nick, "!queue help").await;
        }
        h.staff_says("mod", "!handle").await;
        h.staff_says("mod", "!handle").await;
        h.mock.clear_sent();
        h.staff_says("mod", "!handle").await;
        assert_eq!(
            h.replies("#staff-support"),
            vec!["All available support channels are in use!"]
        );
        assert_eq!(h.bot.sessions().active_sessions().len(), 2);
    }
}
