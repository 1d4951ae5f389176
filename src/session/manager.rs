//! Session manager.
//!
//! Hands out session channels from the configured pool, keeps the registry of
//! active sessions and persists the list of their storage keys.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use super::state::SessionSnapshot;
use super::support::{Cleanup, Session, SessionContext};
use crate::error::{SessionError, StoreError};
use crate::irc::Subscription;
use crate::store::{ACTIVE_SESSIONS_KEY, get_json, get_json_or_default, put_json};

/// Installs a per-channel hook (such as staff commands) for the lifetime of a
/// session in that channel.
pub type ChannelHook = Arc<dyn Fn(&str) -> Subscription + Send + Sync>;

pub struct SessionManager {
    ctx: Arc<SessionContext>,
    /// Lower-cased channel -> session.
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    /// Channels picked by a start that has not finished yet.
    reserved: Mutex<HashSet<String>>,
    channel_hook: Mutex<Option<ChannelHook>>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(ctx: Arc<SessionContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
            channel_hook: Mutex::new(None),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Hook installed in every session channel while its session lives.
    pub fn set_channel_hook(&self, hook: ChannelHook) {
        *self.channel_hook.lock() = Some(hook);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Sessions that have not ended, in pool order.
    pub fn active_sessions(&self) -> Vec<Arc<Session>> {
        let sessions = self.sessions.lock();
        self.ctx
            .irc
            .channels()
            .sessions
            .iter()
            .filter_map(|c| sessions.get(&c.to_lowercase()))
            .filter(|s| !s.is_ended())
            .cloned()
            .collect()
    }

    pub fn session_in(&self, channel: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .get(&channel.to_lowercase())
            .filter(|s| !s.is_ended())
            .cloned()
    }

    /// Whether `nick` is the user of an active session.
    pub fn is_user_in_session(&self, nick: &str) -> bool {
        self.sessions
            .lock()
            .values()
            .any(|s| !s.is_ended() && s.user().eq_ignore_ascii_case(nick))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Restore persisted sessions, then clear out session channels with no
    /// session. Call once the IRC client has joined its channels.
    pub async fn start(self: &Arc<Self>) -> Result<(), StoreError> {
        let store = self.ctx.store.as_ref();
        self.ctx.history.load().await?;

        let keys: Vec<String> = get_json_or_default(store, ACTIVE_SESSIONS_KEY).await?;
        for key in keys {
            let snapshot: SessionSnapshot = match get_json(store, &key).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, "Session record gone, assuming it ended");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let channel = snapshot.chan.clone();
            info!(channel = %channel, "Resuming session");
            let session =
                Session::from_state(self.ctx.clone(), snapshot, self.cleanups_for(&channel))
                    .await?;
            if self.register(&session) {
                session.check_if_in_progress().await;
            }
        }
        self.save_to_state().await?;

        let irc = &self.ctx.irc;
        for channel in &irc.channels().sessions {
            if self.session_in(channel).is_some() {
                continue;
            }
            for nick in irc.users_in(channel) {
                if irc.is_me(&nick) {
                    continue;
                }
                if let Err(e) = irc.part_user_from_channel(channel, &nick) {
                    warn!(channel = %channel, nick = %nick, error = %e, "Failed to clear idle session channel");
                }
            }
        }
        Ok(())
    }

    /// Start a session between `user` and `staff` in the first free channel.
    pub async fn start_support_session(
        self: &Arc<Self>,
        user: &str,
        staff: &str,
        announce: bool,
        reason: &str,
        ip: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let channel = self.reserve_channel()?;
        info!(user = %user, staff = %staff, channel = %channel, "Starting support session");
        let result = self
            .start_in(&channel, user, staff, announce, reason, ip)
            .await;
        self.reserved.lock().remove(&channel.to_lowercase());
        result
    }

    fn reserve_channel(&self) -> Result<String, SessionError> {
        let sessions = self.sessions.lock();
        let mut reserved = self.reserved.lock();
        let channel = self
            .ctx
            .irc
            .channels()
            .sessions
            .iter()
            .find(|c| {
                let key = c.to_lowercase();
                let busy = sessions.get(&key).is_some_and(|s| !s.is_ended());
                !busy && !reserved.contains(&key)
            })
            .ok_or(SessionError::ChannelsExhausted)?;
        reserved.insert(channel.to_lowercase());
        Ok(channel.clone())
    }

    async fn start_in(
        self: &Arc<Self>,
        channel: &str,
        user: &str,
        staff: &str,
        announce: bool,
        reason: &str,
        ip: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let session = Session::new(
            self.ctx.clone(),
            channel,
            staff,
            user,
            reason,
            self.cleanups_for(channel),
        );
        if let Err(e) = session.start_new_session(ip, announce).await {
            session.end_session().await;
            return Err(e);
        }

        if !self.register(&session) {
            warn!(channel = %channel, "Support session ended while starting");
            return Err(SessionError::Internal);
        }
        if let Err(e) = self.save_to_state().await {
            error!(channel = %channel, error = %e, "Error saving new session");
            session.end_session().await;
            return Err(SessionError::Internal);
        }
        Ok(session)
    }

    /// Add a session to the registry unless it has already ended.
    ///
    /// `end_session` flags the session before its cleanups take this lock,
    /// so an ended session is either refused here or removed by its cleanup.
    fn register(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();
        if session.is_ended() {
            return false;
        }
        sessions.insert(session.channel().to_lowercase(), session.clone());
        true
    }

    /// Persist the storage keys of every session that has not ended.
    pub async fn save_to_state(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let keys: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| !s.is_ended())
            .map(|s| s.key())
            .collect();
        put_json(self.ctx.store.as_ref(), ACTIVE_SESSIONS_KEY, &keys).await
    }

    /// End the active session in `channel`. Returns `false` if there is none.
    pub async fn end_session_in(&self, channel: &str) -> bool {
        match self.session_in(channel) {
            Some(session) => {
                session.end_session().await;
                true
            }
            None => false,
        }
    }

    fn cleanups_for(self: &Arc<Self>, channel: &str) -> Vec<Cleanup> {
        let weak = Arc::downgrade(self);
        let key = channel.to_lowercase();
        let mut cleanups = vec![Cleanup::callback(move || remove_session(weak, key))];
        if let Some(hook) = self.channel_hook.lock().clone() {
            cleanups.push(hook(channel).into());
        }
        cleanups
    }
}

/// Drop an ended session from the registry and persist the registry.
async fn remove_session(manager: Weak<SessionManager>, key: String) -> anyhow::Result<()> {
    let Some(manager) = manager.upgrade() else {
        return Ok(());
    };
    {
        let mut sessions = manager.sessions.lock();
        if sessions.get(&key).is_some_and(|s| s.is_ended()) {
            sessions.remove(&key);
        }
    }
    manager.save_to_state().await?;
    Ok(())
}
