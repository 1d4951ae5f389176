//! Chat commands.
//!
//! Each command is a regex hook on one channel. Handlers reply in the channel
//! the command came from, exactly once per request (some replies span
//! several lines).

mod handle;
mod ip;
mod kill;
mod logs;
mod queue;
mod reenable;
mod sessions;
mod unqueue;

use parking_lot::Mutex;
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, Weak};

use crate::api::AccountApi;
use crate::error::IrcError;
use crate::irc::{ChannelMessage, IrcClient, Subscription};
use crate::queue::SupportQueue;
use crate::session::SessionManager;

pub struct Commands {
    irc: Arc<IrcClient>,
    queue: Arc<SupportQueue>,
    sessions: Arc<SessionManager>,
    api: Arc<dyn AccountApi>,
    max_reason_len: usize,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Commands {
    pub fn new(sessions: Arc<SessionManager>, max_reason_len: usize) -> Arc<Self> {
        let ctx = sessions.context();
        Arc::new(Self {
            irc: ctx.irc.clone(),
            queue: ctx.queue.clone(),
            api: ctx.api.clone(),
            sessions,
            max_reason_len,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Install every command hook, and the staff `!reenable` hook for
    /// session channels.
    pub fn register(self: &Arc<Self>) {
        let channels = self.irc.channels();
        let (staff, user) = (channels.staff.as_str(), channels.user.as_str());
        let subs = vec![
            self.hook(user, &queue::PATTERN, queue::user_queue),
            self.hook(staff, &queue::PATTERN, queue::staff_queue),
            self.hook(user, &unqueue::PATTERN, unqueue::user_unqueue),
            self.hook(staff, &unqueue::PATTERN, unqueue::staff_unqueue),
            self.hook(user, &reenable::PATTERN, reenable::user_reenable),
            self.hook(staff, &reenable::PATTERN, reenable::staff_reenable),
            self.hook(staff, &handle::PATTERN, handle::staff_handle),
            self.hook(staff, &sessions::PATTERN, sessions::staff_sessions),
            self.hook(staff, &logs::PATTERN, logs::staff_logs),
            self.hook(staff, &kill::PATTERN, kill::staff_kill),
            self.hook(staff, &ip::PATTERN, ip::staff_ip),
        ];
        self.subscriptions.lock().extend(subs);

        let irc = self.irc.clone();
        let weak = Arc::downgrade(self);
        self.sessions.set_channel_hook(Arc::new(move |channel: &str| {
            hook_with(
                &irc,
                weak.clone(),
                channel,
                &reenable::PATTERN,
                reenable::staff_reenable,
            )
        }));
    }

    fn hook<F, Fut>(self: &Arc<Self>, channel: &str, pattern: &Regex, handler: F) -> Subscription
    where
        F: Fn(Arc<Commands>, ChannelMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        hook_with(&self.irc, Arc::downgrade(self), channel, pattern, handler)
    }

    /// Reply in the channel `msg` was said in.
    fn reply(&self, msg: &ChannelMessage, text: &str) -> Result<(), IrcError> {
        self.irc.message(&msg.channel, text)
    }
}

fn hook_with<F, Fut>(
    irc: &IrcClient,
    commands: Weak<Commands>,
    channel: &str,
    pattern: &Regex,
    handler: F,
) -> Subscription
where
    F: Fn(Arc<Commands>, ChannelMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    irc.add_message_hook(channel, pattern.clone(), move |msg| {
        let fut = commands.upgrade().map(|commands| handler(commands, msg));
        async move {
            match fut {
                Some(fut) => fut.await,
                None => Ok(()),
            }
        }
    })
}

/// Capture `group` of the first match, if it participated.
fn capture<'t>(pattern: &Regex, text: &'t str, group: usize) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str())
}
