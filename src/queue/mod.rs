//! Support queue.
//!
//! Ordered waiting list of users asking for help in the user-support channel,
//! plus idle timers for users who sit there without queuing. The queue is
//! persisted after every mutation.

mod idle;

pub use idle::IdleTimer;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{IrcError, QueueError, StoreError};
use crate::irc::{IrcClient, NickChanged, Subscription, UserJoined, UserLeft};
use crate::store::{QUEUE_KEY, Store, get_json_or_default, put_json};

/// IP recorded when WHOIS does not reveal one.
pub const UNAVAILABLE_IP: &str = "Unavailable";

/// One waiting user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUser {
    pub nick: String,
    pub reason: String,
    pub time: DateTime<Utc>,
    pub ip: String,
}

fn welcome_message(nick: &str) -> String {
    format!(
        "Hi {nick}! If you need your account re-enabled please type !reenable <your username>. \
         Otherwise please enter the support queue with !queue <reason you need assistance>."
    )
}

fn nag_message(nick: &str) -> String {
    format!(
        "Hi {nick}, we do not allow idling in support channels. \
         Please queue with !queue <reason> or part the channel."
    )
}

pub struct SupportQueue {
    irc: Arc<IrcClient>,
    store: Arc<dyn Store>,
    policy: QueueConfig,
    users: Mutex<Vec<QueuedUser>>,
    idle: Mutex<HashMap<String, IdleTimer>>,
    /// Serializes writes so the last write always carries the latest queue.
    persist_lock: tokio::sync::Mutex<()>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SupportQueue {
    pub fn new(irc: Arc<IrcClient>, store: Arc<dyn Store>, policy: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            irc,
            store,
            policy,
            users: Mutex::new(Vec::new()),
            idle: Mutex::new(HashMap::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Load the persisted queue and subscribe to IRC events.
    ///
    /// Call before the IRC client connects.
    pub async fn init(self: &Arc<Self>) -> Result<(), StoreError> {
        let users: Vec<QueuedUser> = get_json_or_default(self.store.as_ref(), QUEUE_KEY).await?;
        info!(queued = users.len(), "Loaded support queue");
        *self.users.lock() = users;
        self.subscribe();
        Ok(())
    }

    fn subscribe(self: &Arc<Self>) {
        let mut subs = Vec::with_capacity(5);

        let weak = Arc::downgrade(self);
        subs.push(self.irc.add_join_handler(move |event: UserJoined| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(queue) => queue.handle_join(event).await,
                    None => Ok(()),
                }
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.irc.add_leave_handler(move |event: UserLeft| {
            let queue = weak.upgrade();
            if let Some(queue) = &queue
                && queue.is_user_channel(&event.channel)
            {
                queue.remove_unqueued_user(&event.nick);
            }
            async move {
                match queue {
                    Some(queue) => queue.handle_leave(event).await,
                    None => Ok(()),
                }
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.irc.add_rename_handler(move |event: NickChanged| {
            let weak = weak.clone();
            async move {
                if let Some(queue) = weak.upgrade() {
                    queue.rename_user(&event.old, &event.new).await?;
                }
                Ok(())
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.irc.add_disconnect_handler(move |_| {
            if let Some(queue) = weak.upgrade() {
                queue.clear_unqueued_users();
            }
            async { Ok(()) }
        }));

        let weak = Arc::downgrade(self);
        subs.push(self.irc.add_connect_handler(move |_| {
            let weak = weak.clone();
            async move {
                if let Some(queue) = weak.upgrade() {
                    queue.now_connected().await?;
                }
                Ok(())
            }
        }));

        self.subscriptions.lock().extend(subs);
    }

    fn is_user_channel(&self, channel: &str) -> bool {
        self.irc.channels().user.eq_ignore_ascii_case(channel)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_in_queue(&self, nick: &str) -> bool {
        self.users
            .lock()
            .iter()
            .any(|u| u.nick.eq_ignore_ascii_case(nick))
    }

    /// Copy of the queue in wait order.
    pub fn snapshot(&self) -> Vec<QueuedUser> {
        self.users.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    /// Nick at the head of the queue.
    pub fn next_nick(&self) -> Option<String> {
        self.users.lock().first().map(|u| u.nick.clone())
    }

    /// Whether an idle timer is pending for `nick`.
    pub fn has_idle_timer(&self, nick: &str) -> bool {
        self.idle.lock().contains_key(&nick.to_lowercase())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let users = self.snapshot();
        put_json(self.store.as_ref(), QUEUE_KEY, &users).await
    }

    /// Add `nick` to the end of the queue.
    ///
    /// Returns `false` if the nick was already queued.
    pub async fn queue_user(&self, nick: &str, reason: &str) -> Result<bool, QueueError> {
        self.remove_unqueued_user(nick);
        if self.is_in_queue(nick) {
            return Ok(false);
        }
        let whois = self.irc.whois(nick).await?;
        let ip = whois
            .actual_ip
            .unwrap_or_else(|| UNAVAILABLE_IP.to_string());

        {
            let mut users = self.users.lock();
            if users.iter().any(|u| u.nick.eq_ignore_ascii_case(nick)) {
                return Ok(false);
            }
            users.push(QueuedUser {
                nick: nick.to_string(),
                reason: reason.to_string(),
                time: Utc::now(),
                ip,
            });
        }
        self.remove_unqueued_user(nick);
        self.persist().await?;
        info!(nick = %nick, reason = %reason, "User queued");

        let staff = &self.irc.channels().staff;
        if let Err(e) = self
            .irc
            .message(staff, &format!("User {nick} requires support: {reason}"))
        {
            warn!(error = %e, "Failed to announce queued user");
        }
        Ok(true)
    }

    /// Remove the user at zero-based `index`.
    pub async fn unqueue_by_position(&self, index: usize) -> Result<QueuedUser, QueueError> {
        let user = {
            let mut users = self.users.lock();
            if users.is_empty() {
                return Err(QueueError::Empty);
            }
            if index >= users.len() {
                return Err(QueueError::OutOfRange(users.len()));
            }
            users.remove(index)
        };
        self.persist().await?;
        debug!(nick = %user.nick, index, "Unqueued by position");
        Ok(user)
    }

    /// Remove `nick` from the queue.
    pub async fn unqueue_by_nick(&self, nick: &str) -> Result<QueuedUser, QueueError> {
        let user = {
            let mut users = self.users.lock();
            if users.is_empty() {
                return Err(QueueError::Empty);
            }
            let Some(index) = users.iter().position(|u| u.nick.eq_ignore_ascii_case(nick)) else {
                return Err(QueueError::NotQueued(nick.to_string()));
            };
            users.remove(index)
        };
        self.persist().await?;
        debug!(nick = %user.nick, "Unqueued by nick");
        Ok(user)
    }

    /// Like [`unqueue_by_nick`](Self::unqueue_by_nick) but absence is not an error.
    pub async fn unqueue_by_nick_silent(&self, nick: &str) -> Result<Option<QueuedUser>, QueueError> {
        match self.unqueue_by_nick(nick).await {
            Ok(user) => Ok(Some(user)),
            Err(QueueError::Empty | QueueError::NotQueued(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rename_user(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let renamed = {
            let mut users = self.users.lock();
            match users.iter_mut().find(|u| u.nick.eq_ignore_ascii_case(old)) {
                Some(user) => {
                    user.nick = new.to_string();
                    true
                }
                None => false,
            }
        };
        if renamed {
            return self.persist().await;
        }

        let mut idle = self.idle.lock();
        if let Some(mut timer) = idle.remove(&old.to_lowercase()) {
            timer.rename(new);
            idle.insert(new.to_lowercase(), timer);
        }
        Ok(())
    }

    // ========================================================================
    // Idle policy
    // ========================================================================

    /// Start (or restart) the nag-then-kick timer for a user idling in the
    /// support channel. Staff, channel operators, queued users and users not
    /// in the channel are left alone.
    pub async fn add_unqueued_user(self: &Arc<Self>, nick: &str) -> Result<(), IrcError> {
        let channel = self.irc.channels().user.clone();
        if !self.irc.is_user_in_channel(&channel, nick) || self.is_in_queue(nick) {
            return Ok(());
        }
        if self.irc.is_staff(nick).await? || self.irc.is_channel_op(&channel, nick).await? {
            return Ok(());
        }

        // Queued or gone while WHOIS/WHO were in flight. `queue_user` clears
        // timers after pushing, so this check must hold the idle lock.
        let mut idle = self.idle.lock();
        if !self.irc.is_user_in_channel(&channel, nick) || self.is_in_queue(nick) {
            return Ok(());
        }
        let id = IdleTimer::next_id();
        let weak = Arc::downgrade(self);
        let nag_after = self.policy.nag_after();
        let kick_after = self.policy.kick_after();
        let timer = IdleTimer::spawn(id, nick, idle_task(weak, id, channel, nag_after, kick_after));
        idle.insert(nick.to_lowercase(), timer);
        debug!(nick = %nick, "Started idle timer");
        Ok(())
    }

    pub fn remove_unqueued_user(&self, nick: &str) {
        if self.idle.lock().remove(&nick.to_lowercase()).is_some() {
            debug!(nick = %nick, "Cancelled idle timer");
        }
    }

    pub fn clear_unqueued_users(&self) {
        self.idle.lock().clear();
    }

    fn idle_nick(&self, id: u64) -> Option<String> {
        self.idle
            .lock()
            .values()
            .find(|t| t.id() == id)
            .map(|t| t.nick().to_string())
    }

    /// Remove the timer with `id`, returning the nick it was tracking.
    fn take_idle(&self, id: u64) -> Option<String> {
        let mut idle = self.idle.lock();
        let key = idle
            .iter()
            .find(|(_, t)| t.id() == id)
            .map(|(k, _)| k.clone())?;
        idle.remove(&key).map(|t| t.nick().to_string())
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    async fn handle_join(self: Arc<Self>, event: UserJoined) -> anyhow::Result<()> {
        if !self.is_user_channel(&event.channel) || self.irc.is_staff(&event.nick).await? {
            return Ok(());
        }
        self.irc
            .message(&self.irc.channels().user, &welcome_message(&event.nick))?;
        // Give services a moment to op the user before checking.
        sleep(self.policy.join_grace()).await;
        self.add_unqueued_user(&event.nick).await?;
        Ok(())
    }

    async fn handle_leave(self: Arc<Self>, event: UserLeft) -> anyhow::Result<()> {
        if !self.is_user_channel(&event.channel) {
            return Ok(());
        }
        self.remove_unqueued_user(&event.nick);
        if let Some(user) = self.unqueue_by_nick_silent(&event.nick).await? {
            info!(nick = %user.nick, kind = %event.kind, "Queued user left the support channel");
        }
        Ok(())
    }

    /// Reconcile after (re)joining: drop queued users who are gone and start
    /// idle timers for everyone present but not queued.
    pub async fn now_connected(self: &Arc<Self>) -> Result<(), QueueError> {
        let channel = self.irc.channels().user.clone();
        let present = self.irc.users_in(&channel);
        let dropped = {
            let mut users = self.users.lock();
            let before = users.len();
            users.retain(|u| present.contains(&u.nick.to_lowercase()));
            before - users.len()
        };
        self.persist().await?;
        if dropped > 0 {
            info!(dropped, "Removed queued users no longer in the support channel");
        }

        for nick in present {
            if self.irc.is_me(&nick) || self.is_in_queue(&nick) {
                continue;
            }
            if let Err(e) = self.add_unqueued_user(&nick).await {
                warn!(nick = %nick, error = %e, "Could not start idle timer");
            }
        }
        Ok(())
    }
}

async fn idle_task(
    queue: Weak<SupportQueue>,
    id: u64,
    channel: String,
    nag_after: std::time::Duration,
    kick_after: std::time::Duration,
) {
    sleep(nag_after).await;
    {
        let Some(queue) = queue.upgrade() else { return };
        let Some(nick) = queue.idle_nick(id) else { return };
        if let Err(e) = queue.irc.message(&channel, &nag_message(&nick)) {
            warn!(nick = %nick, error = %e, "Failed to nag idle user");
        }
    }

    sleep(kick_after).await;
    let Some(queue) = queue.upgrade() else { return };
    let Some(nick) = queue.take_idle(id) else { return };
    info!(nick = %nick, "Kicking idle user from the support channel");
    if let Err(e) = queue.irc.kick_user_from_channel(&channel, &nick) {
        warn!(nick = %nick, error = %e, "Failed to kick idle user");
    }
}
