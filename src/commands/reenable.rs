//! `!reenable`: re-enable pruned site accounts.
//!
//! Users get the anonymous path, which may fall back to queueing them for
//! staff. Staff (in the staff channel or a session channel) re-enable
//! directly; in a session channel the reply is addressed to the user.

use chrono::{DateTime, Days, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error};

use super::{Commands, capture};
use crate::api::ReEnableResponse;
use crate::irc::ChannelMessage;
use crate::irc::format::minutes_to_string;

pub(super) static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^!reenable(?:\s*([a-zA-Z0-9_-]+))(?:\s*(.+))?").expect("hardcoded regex")
});

const PROFILE_URL: &str = "https://animebytes.tv/user/profile";
const RULES_URL: &str = "https://animebytes.tv/rules";

/// Welcome text for a freshly re-enabled account.
fn reenabled_message(username: &str, now: DateTime<Utc>) -> String {
    let midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc());
    let minutes = midnight.map_or(0, |m| (m - now).num_minutes());
    format!(
        "User reenabled! Welcome back {username}, please login by 00:00 UTC (within {} from now) \
         in order to prevent being disabled again. To prevent inactivity pruning from here on, \
         you are required to visit the site within a ten week period per cycle. Reenables are a \
         very limited service and repeat prunes will lead to permanent account closure. \
         Please re-read the rules again: {RULES_URL}",
        minutes_to_string(minutes)
    )
}

fn failure_text(response: &ReEnableResponse, username: &str) -> String {
    match response.error.as_deref() {
        Some(error) if !error.is_empty() => error.to_string(),
        _ => format!("Unknown error reenabling {username}"),
    }
}

pub(super) async fn user_reenable(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    let Some(username) = capture(&PATTERN, &msg.text, 1) else {
        return Ok(());
    };
    debug!(nick = %msg.nick, username = %username, "User reenable request");
    let text = match user_attempt(&cmds, &msg, username).await {
        Ok(text) => text,
        Err(e) => {
            error!(username = %username, error = %e, "Error calling user reenable");
            "Your account could not be reenabled for technical reasons. Please try again."
                .to_string()
        }
    };
    cmds.reply(&msg, &text)?;
    Ok(())
}

async fn user_attempt(
    cmds: &Commands,
    msg: &ChannelMessage,
    username: &str,
) -> anyhow::Result<String> {
    let response = cmds.api.reenable_anonymous(username).await?;
    if response.success {
        return Ok(reenabled_message(username, Utc::now()));
    }
    if response.queue {
        let reason = format!("User {username} ({PROFILE_URL}/{username}) needs staff reenabling");
        cmds.queue.queue_user(&msg.nick, &reason).await?;
        return Ok("Your account could not be automatically reenabled! \
                   You've been added to the support queue, please wait for assistance."
            .to_string());
    }
    Ok(failure_text(&response, username))
}

pub(super) async fn staff_reenable(cmds: Arc<Commands>, msg: ChannelMessage) -> anyhow::Result<()> {
    let Some(username) = capture(&PATTERN, &msg.text, 1) else {
        return Ok(());
    };
    if !cmds.irc.is_staff(&msg.nick).await? {
        return Ok(());
    }
    debug!(nick = %msg.nick, username = %username, "Staff reenable request");

    let enabler = msg.hostname.split('.').next().unwrap_or_default();
    let reason = capture(&PATTERN, &msg.text, 2);
    let text = match cmds.api.reenable_as_staff(username, enabler, reason).await {
        Ok(response) if response.success => {
            if cmds.irc.channels().is_session_channel(&msg.channel) {
                reenabled_message(username, Utc::now())
            } else {
                "User reenabled!".to_string()
            }
        }
        Ok(response) => failure_text(&response, username),
        Err(e) => {
            error!(username = %username, error = %e, "Error calling staff reenable");
            "Account could not be reenabled for technical reasons. Please try again.".to_string()
        }
    };
    cmds.reply(&msg, &text)?;
    Ok(())
}
