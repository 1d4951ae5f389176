//! A single support conversation.
//!
//! Lifecycle: pending until [`Session::start_new_session`] completes, then
//! started until [`Session::end_session`], which runs at most once. A started
//! session records every line said in its channel and persists itself after
//! each line.

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use tracing::{debug, error, info, warn};

use super::history::LogHistory;
use super::state::{PreviousLog, SessionSnapshot};
use crate::api::AccountApi;
use crate::error::{IrcError, SessionError, StoreError};
use crate::irc::format::{colored, friendly_date, next_color, space, space_nick_in};
use crate::irc::{ChannelMessage, IrcClient, NickChanged, Subscription, UserJoined, UserLeft};
use crate::queue::SupportQueue;
use crate::store::{Store, put_json, session_key};

static ANY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(".*").expect("hardcoded regex"));

const PASSPHRASE_LEN: usize = 16;

/// Services a session needs, shared by every session of a manager.
pub struct SessionContext {
    pub irc: Arc<IrcClient>,
    pub queue: Arc<SupportQueue>,
    pub store: Arc<dyn Store>,
    pub api: Arc<dyn AccountApi>,
    pub history: Arc<LogHistory>,
    /// Where finished transcripts are written.
    pub logs_dir: PathBuf,
}

pub type CleanupFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Work to run when a session ends.
pub enum Cleanup {
    Unsubscribe(Subscription),
    Callback(Box<dyn FnOnce() -> CleanupFuture + Send>),
}

impl Cleanup {
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::Callback(Box::new(move || Box::pin(f())))
    }

    async fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Unsubscribe(subscription) => {
                subscription.cancel();
                Ok(())
            }
            Self::Callback(f) => f().await,
        }
    }
}

impl From<Subscription> for Cleanup {
    fn from(subscription: Subscription) -> Self {
        Self::Unsubscribe(subscription)
    }
}

struct Participants {
    staff: String,
    user: String,
}

pub struct Session {
    ctx: Arc<SessionContext>,
    channel: String,
    reason: String,
    color: String,
    start_time: DateTime<Utc>,
    participants: Mutex<Participants>,
    transcript: Mutex<Vec<String>>,
    started: AtomicBool,
    ended: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
    /// Orders snapshot writes against the final delete.
    persist_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("staff", &self.staff())
            .field("user", &self.user())
            .field("started", &self.is_started())
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A pending session in `channel`. Event wiring is live immediately.
    pub fn new(
        ctx: Arc<SessionContext>,
        channel: &str,
        staff: &str,
        user: &str,
        reason: &str,
        cleanups: Vec<Cleanup>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            ctx,
            channel: channel.to_string(),
            reason: reason.to_string(),
            color: next_color(),
            start_time: Utc::now(),
            participants: Mutex::new(Participants {
                staff: staff.to_string(),
                user: user.to_string(),
            }),
            transcript: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            cleanups: Mutex::new(cleanups),
            persist_lock: tokio::sync::Mutex::new(()),
        });
        session.wire();
        session
    }

    /// Resume a persisted session. Sessions on disk are always started.
    pub async fn from_state(
        ctx: Arc<SessionContext>,
        snapshot: SessionSnapshot,
        cleanups: Vec<Cleanup>,
    ) -> Result<Arc<Self>, StoreError> {
        let joined = ctx.irc.is_joined();
        let session = Arc::new(Self {
            ctx,
            channel: snapshot.chan,
            reason: snapshot.reason,
            color: snapshot.color,
            start_time: snapshot.time,
            participants: Mutex::new(Participants {
                staff: snapshot.staff,
                user: snapshot.user,
            }),
            transcript: Mutex::new(snapshot.log),
            started: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            cleanups: Mutex::new(cleanups),
            persist_lock: tokio::sync::Mutex::new(()),
        });
        session.wire();
        if joined {
            session.log_msg("--- Reconnected to IRC ---").await?;
        }
        Ok(session)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn staff(&self) -> String {
        self.participants.lock().staff.clone()
    }

    pub fn user(&self) -> String {
        self.participants.lock().user.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().clone()
    }

    /// Storage key of this session's snapshot.
    pub fn key(&self) -> String {
        session_key(&self.channel)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let participants = self.participants.lock();
        SessionSnapshot {
            chan: self.channel.clone(),
            staff: participants.staff.clone(),
            user: participants.user.clone(),
            reason: self.reason.clone(),
            time: self.start_time,
            color: self.color.clone(),
            log: self.transcript(),
        }
    }

    fn is_my_channel(&self, channel: &str) -> bool {
        self.channel.eq_ignore_ascii_case(channel)
    }

    // ========================================================================
    // Event wiring
    // ========================================================================

    fn wire(self: &Arc<Self>) {
        let irc = &self.ctx.irc;
        let mut subs: Vec<Cleanup> = Vec::with_capacity(6);

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_message_hook(&self.channel, ANY_LINE.clone(), move |msg: ChannelMessage| {
                let session = weak.upgrade();
                if let Some(session) = &session {
                    session.record(&format!("{}: {}", msg.nick, msg.text));
                }
                save_later(session)
            })
            .into(),
        );

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_disconnect_handler(move |_| {
                let session = weak.upgrade();
                if let Some(session) = &session {
                    session.record("--- Disconnected from IRC ---");
                }
                save_later(session)
            })
            .into(),
        );

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_connect_handler(move |_| {
                let session = weak.upgrade();
                if let Some(session) = &session {
                    session.record("--- Reconnected to IRC ---");
                }
                async move {
                    if let Some(session) = session {
                        session.save_to_state().await?;
                        session.check_if_in_progress().await;
                    }
                    Ok(())
                }
            })
            .into(),
        );

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_join_handler(move |event: UserJoined| {
                let session = upgrade_for(&weak, &event.channel);
                if let Some(session) = &session {
                    session.record(&format!("{} has joined.", event.nick));
                }
                save_later(session)
            })
            .into(),
        );

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_leave_handler(move |event: UserLeft| {
                let session = upgrade_for(&weak, &event.channel);
                if let Some(session) = &session {
                    session.record(&format!("{} has left ({}).", event.nick, event.kind));
                }
                async move {
                    if let Some(session) = session {
                        session.save_to_state().await?;
                        session.check_if_in_progress().await;
                    }
                    Ok(())
                }
            })
            .into(),
        );

        let weak = Arc::downgrade(self);
        subs.push(
            irc.add_rename_handler(move |event: NickChanged| {
                let session = weak
                    .upgrade()
                    .filter(|session| session.rename(&event.old, &event.new));
                if let Some(session) = &session {
                    session.record(&format!(
                        "{} has changed their nick to {}.",
                        event.old, event.new
                    ));
                }
                save_later(session)
            })
            .into(),
        );

        self.cleanups.lock().extend(subs);
    }

    /// Follow a participant's nick change. Returns whether anything changed.
    fn rename(&self, old: &str, new: &str) -> bool {
        let mut participants = self.participants.lock();
        let mut changed = false;
        if participants.staff.eq_ignore_ascii_case(old) {
            participants.staff = new.to_string();
            changed = true;
        }
        if participants.user.eq_ignore_ascii_case(old) {
            participants.user = new.to_string();
            changed = true;
        }
        changed
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring staff and user together in the session channel.
    ///
    /// On failure the session stays pending and the caller must end it to
    /// release the channel.
    pub async fn start_new_session(&self, user_ip: &str, announce: bool) -> Result<(), SessionError> {
        self.try_start(user_ip, announce).await.map_err(|e| {
            error!(channel = %self.channel, error = %e, "Unexpected error starting new support session");
            SessionError::Internal
        })
    }

    async fn try_start(&self, user_ip: &str, announce: bool) -> anyhow::Result<()> {
        let irc = &self.ctx.irc;
        let channel = &self.channel;
        let (staff, user) = (self.staff(), self.user());

        self.part_occupants()?;
        irc.set_up_session_channel(channel)?;
        irc.notice(
            &staff,
            &format!("Starting support session for {user} in {channel}, user IP: {user_ip}"),
        )?;
        self.log_msg(&format!(
            "Beginning support conversation between {user} and {staff} in {channel}. Reason: {}",
            self.reason
        ))
        .await?;

        irc.join_user_to_channel(channel, &staff).await?;
        irc.join_user_to_channel(channel, &user).await?;
        irc.notice(
            &user,
            &format!("{user}, you are now being helped by {staff} in {channel}"),
        )?;

        self.ctx.queue.unqueue_by_nick_silent(&user).await?;
        let user_channel = &irc.channels().user;
        irc.part_user_from_channel(user_channel, &user)?;
        if announce {
            let mut text = format!("Now helping {user}.");
            if let Some(next) = self.ctx.queue.next_nick() {
                text.push_str(&format!(" Next in queue: {next}"));
            }
            irc.message(user_channel, &text)?;
        }

        self.started.store(true, Ordering::SeqCst);
        info!(channel = %channel, staff = %staff, user = %user, "Support session started");
        Ok(())
    }

    /// Append a transcript line, relay it to the log channel and persist.
    pub async fn log_msg(&self, text: &str) -> Result<(), StoreError> {
        self.record(text);
        self.save_to_state().await
    }

    /// Append a transcript line and relay it to the log channel.
    ///
    /// Event handlers call this before their first await, so lines land in
    /// the order the events arrived.
    fn record(&self, text: &str) {
        let now = friendly_date(Utc::now());
        self.transcript.lock().push(format!("{now} | {text}"));

        let staff = self.staff();
        let relay = format!(
            "{} - {}",
            colored(&self.color, &self.channel),
            space_nick_in(text, &staff)
        );
        if let Err(e) = self.ctx.irc.message(&self.ctx.irc.channels().log, &relay) {
            warn!(channel = %self.channel, error = %e, "Unable to send message to log channel");
        }
    }

    async fn save_to_state(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        if self.is_ended() {
            return Ok(());
        }
        put_json(self.ctx.store.as_ref(), &self.key(), &self.snapshot()).await
    }

    /// End the session if either participant has left its channel.
    pub async fn check_if_in_progress(&self) {
        if !self.is_started() || self.is_ended() {
            return;
        }
        let (staff, user) = (self.staff(), self.user());
        let irc = &self.ctx.irc;
        if !irc.is_user_in_channel(&self.channel, &staff)
            || !irc.is_user_in_channel(&self.channel, &user)
        {
            debug!(channel = %self.channel, "Participant missing, ending session");
            self.end_session().await;
        }
    }

    /// Tear the session down. Only the first call does anything.
    pub async fn end_session(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.is_started() {
            self.archive().await;
        }

        if let Err(e) = self.part_occupants() {
            warn!(channel = %self.channel, error = %e, "Failed to clear session channel");
        }

        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            if let Err(e) = cleanup.run().await {
                error!(channel = %self.channel, error = %e, "Exception when calling session cleanup callback");
            }
        }

        {
            let _guard = self.persist_lock.lock().await;
            if let Err(e) = self.ctx.store.delete(&self.key()).await {
                error!(channel = %self.channel, error = %e, "Failed to remove session from state");
            }
        }
        info!(
            channel = %self.channel,
            staff = %self.staff(),
            user = %self.user(),
            "Support session has ended"
        );
    }

    /// Write the transcript to disk, upload it and announce the result.
    async fn archive(&self) {
        let ctx = &self.ctx;
        let now = Utc::now();
        let (staff, user) = (self.staff(), self.user());
        let body = self.transcript().join("\n");
        let name = format!(
            "{} {} {user} {staff}.log",
            self.channel,
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        let path = ctx.logs_dir.join(&name);
        if let Err(e) = tokio::fs::write(&path, &body).await {
            error!(path = %path.display(), error = %e, "Unexpected error writing log file");
        }

        let passphrase = random_passphrase();
        let paste = match ctx.api.create_paste(&name, &body, &passphrase).await {
            Ok(url) => {
                ctx.history.push(PreviousLog {
                    user: user.clone(),
                    staff: staff.clone(),
                    time: now,
                    paste: url.clone(),
                });
                Some(url)
            }
            Err(e) => {
                error!(channel = %self.channel, error = %e, "Error uploading logs");
                None
            }
        };
        if let Err(e) = ctx.history.persist().await {
            error!(error = %e, "Error saving log to state");
        }

        let outcome = match paste {
            Some(url) => format!("A log can be found at {url}"),
            None => "I could not properly upload the logs, but they should be saved locally."
                .to_string(),
        };
        let text = format!(
            "Support conversation in {} between {user} and {} complete. {outcome}",
            self.channel,
            space(&staff)
        );
        if let Err(e) = ctx.irc.message(&ctx.irc.channels().log, &text) {
            error!(error = %e, "Error sending message to log channel");
        }
    }

    /// SAPART everyone but the bot from the session channel.
    fn part_occupants(&self) -> Result<(), IrcError> {
        let irc = &self.ctx.irc;
        for nick in irc.users_in(&self.channel) {
            if !irc.is_me(&nick) {
                irc.part_user_from_channel(&self.channel, &nick)?;
            }
        }
        Ok(())
    }
}

/// Upgrade `weak` only for events in the session's own channel.
/// Persist whatever `record` just appended.
fn save_later(session: Option<Arc<Session>>) -> impl Future<Output = anyhow::Result<()>> {
    async move {
        if let Some(session) = session {
            session.save_to_state().await?;
        }
        Ok(())
    }
}

fn upgrade_for(weak: &Weak<Session>, channel: &str) -> Option<Arc<Session>> {
    weak.upgrade().filter(|s| s.is_my_channel(channel))
}

fn random_passphrase() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSPHRASE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::{MockTransport, TransportEvent};
    use crate::store::{MemoryStore, get_json};
    use crate::testing::{FakeApi, connected, make_staff, settle, test_config};
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        ctx: Arc<SessionContext>,
        mock: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        api: Arc<FakeApi>,
        logs: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let config = test_config();
        let (irc, mock) = connected(&config).await;
        let store = Arc::new(MemoryStore::new());
        let queue = SupportQueue::new(irc.clone(), store.clone(), config.queue.clone());
        queue.init().await.unwrap();
        let api = Arc::new(FakeApi::default());
        let logs = tempfile::tempdir().unwrap();
        let ctx = Arc::new(SessionContext {
            irc,
            queue,
            store: store.clone(),
            api: api.clone(),
            history: Arc::new(LogHistory::new(store.clone())),
            logs_dir: logs.path().to_path_buf(),
        });
        make_staff(&mock, "mod");
        Fixture {
            ctx,
            mock,
            store,
            api,
            logs,
        }
    }

    fn counting_cleanup(count: &Arc<AtomicUsize>) -> Cleanup {
        let count = count.clone();
        Cleanup::callback(move || async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    async fn started(f: &Fixture, cleanups: Vec<Cleanup>) -> Arc<Session> {
        let session = Session::new(f.ctx.clone(), "#s1", "mod", "alice", "help me", cleanups);
        session.start_new_session("192.0.2.1", true).await.unwrap();
        settle().await;
        session
    }

    // ========================================================================
    // Start
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_start_brings_parties_together() {
        let f = fixture().await;
        f.mock.emit(TransportEvent::Join {
            channel: "#user-support".into(),
            nick: "alice".into(),
        });
        f.mock.emit(TransportEvent::Join {
            channel: "#user-support".into(),
            nick: "bob".into(),
        });
        settle().await;
        f.ctx.queue.queue_user("alice", "help me").await.unwrap();
        f.ctx.queue.queue_user("bob", "me too").await.unwrap();
        f.mock.clear_sent();

        let session = started(&f, vec![]).await;
        assert!(session.is_started());
        assert!(!session.is_ended());
        assert_eq!(f.ctx.queue.len(), 1);

        let sent = f.mock.sent();
        assert!(sent.contains(&"NOTICE mod :Starting support session for alice in #s1, user IP: 192.0.2.1".to_string()));
        assert!(sent.contains(&"SAJOIN mod #s1".to_string()));
        assert!(sent.contains(&"SAJOIN alice #s1".to_string()));
        assert!(sent.contains(&"NOTICE alice :alice, you are now being helped by mod in #s1".to_string()));
        assert!(sent.contains(&"SAPART alice #user-support".to_string()));
        assert!(sent.contains(&"PRIVMSG #user-support :Now helping alice. Next in queue: bob".to_string()));

        let snapshot: SessionSnapshot = get_json(f.store.as_ref(), &session.key()).await.unwrap();
        assert_eq!(snapshot.user, "alice");
        assert!(snapshot.log[0].ends_with(
            "| Beginning support conversation between alice and mod in #s1. Reason: help me"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_parts_stray_occupants() {
        let f = fixture().await;
        f.mock.emit(TransportEvent::Join {
            channel: "#s1".into(),
            nick: "lurker".into(),
        });
        settle().await;
        let _session = started(&f, vec![]).await;
        assert_eq!(f.mock.sent_matching("SAPART lurker"), vec!["SAPART lurker #s1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_stays_pending_and_hides_details() {
        let f = fixture().await;
        f.mock.ignore_joins_of("alice");
        let session = Session::new(f.ctx.clone(), "#s1", "mod", "alice", "help", vec![]);
        let err = session.start_new_session("N/A", false).await.unwrap_err();
        assert_eq!(err, SessionError::Internal);
        assert_eq!(err.to_string(), "Internal Error");
        assert!(!session.is_started());
    }

    // ========================================================================
    // Transcript
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_channel_events_are_transcribed() {
        let f = fixture().await;
        let session = started(&f, vec![]).await;
        f.mock.emit(TransportEvent::Message {
            nick: "alice".into(),
            ident: "alice".into(),
            hostname: "user.example".into(),
            target: "#s1".into(),
            text: "my account is disabled".into(),
        });
        f.mock.emit(TransportEvent::Message {
            nick: "carol".into(),
            ident: "carol".into(),
            hostname: "user.example".into(),
            target: "#elsewhere".into(),
            text: "unrelated".into(),
        });
        f.mock.emit(TransportEvent::Nick {
            old: "alice".into(),
            new: "alicia".into(),
        });
        settle().await;

        assert_eq!(session.user(), "alicia");
        let transcript = session.transcript();
        let lines: Vec<&str> = transcript
            .iter()
            .map(|l| l.split_once(" | ").unwrap().1)
            .collect();
        assert!(lines.contains(&"alice: my account is disabled"));
        assert!(lines.contains(&"alice has changed their nick to alicia."));
        assert!(!lines.iter().any(|l| l.contains("unrelated")));

        let relay = f.mock.sent_matching("PRIVMSG #support-logging");
        assert!(relay.iter().any(|l| l.ends_with(" - alice: my account is disabled")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_relay_spaces_staff_nick() {
        let f = fixture().await;
        let session = Session::new(f.ctx.clone(), "#s1", "mod", "alice", "help", vec![]);
        f.mock.clear_sent();
        session.log_msg("MOD: hello").await.unwrap();
        let relay = f.mock.sent_matching("PRIVMSG #support-logging");
        assert_eq!(relay.len(), 1);
        assert!(relay[0].ends_with(" - M\u{200B}O\u{200B}D: hello"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transcript_keeps_arrival_order_across_workers() {
        let f = fixture().await;
        let session = started(&f, vec![]).await;
        for i in 0..500 {
            f.mock.emit(TransportEvent::Message {
                nick: "alice".into(),
                ident: "alice".into(),
                hostname: "user.example".into(),
                target: "#s1".into(),
                text: format!("line {i}"),
            });
        }

        let numbers = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let numbers: Vec<usize> = session
                    .transcript()
                    .iter()
                    .filter_map(|l| l.split_once(" | alice: line ")?.1.parse().ok())
                    .collect();
                if numbers.len() == 500 {
                    return numbers;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all lines recorded");
        assert_eq!(numbers, (0..500).collect::<Vec<_>>());

        let relayed: Vec<String> = f
            .mock
            .sent_matching("PRIVMSG #support-logging")
            .into_iter()
            .filter(|l| l.contains(" - alice: line "))
            .collect();
        assert_eq!(relayed.len(), 500);
        assert!(relayed[0].ends_with(" - alice: line 0"));
        assert!(relayed[499].ends_with(" - alice: line 499"));
    }

    // ========================================================================
    // Progress checks and ending
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_check_is_noop_before_start() {
        let f = fixture().await;
        let session = Session::new(f.ctx.clone(), "#s1", "mod", "alice", "help", vec![]);
        session.check_if_in_progress().await;
        assert!(!session.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_ends_only_when_a_party_is_missing() {
        let f = fixture().await;
        let session = started(&f, vec![]).await;
        session.check_if_in_progress().await;
        assert!(!session.is_ended());

        f.mock.emit(TransportEvent::Part {
            channel: "#s1".into(),
            nick: "mod".into(),
        });
        settle().await;
        assert!(session.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_session_runs_once() {
        let f = fixture().await;
        let cleanups = Arc::new(AtomicUsize::new(0));
        let session = started(&f, vec![counting_cleanup(&cleanups)]).await;

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move { session.end_session().await }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(session.is_ended());
        assert_eq!(f.api.paste_count(), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!f.store.contains(&session.key()));
        assert_eq!(std::fs::read_dir(f.logs.path()).unwrap().count(), 1);
        assert_eq!(f.ctx.history.entries().len(), 1);
        let done = f.mock.sent_matching("PRIVMSG #support-logging :Support conversation in #s1");
        assert_eq!(done.len(), 1);
        assert!(done[0].contains("A log can be found at https://example.test/pastes/1?passphrase="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_degrades_gracefully() {
        let f = fixture().await;
        f.api.fail_pastes(true);
        let session = started(&f, vec![]).await;
        session.end_session().await;
        assert!(f.ctx.history.entries().is_empty());
        assert_eq!(std::fs::read_dir(f.logs.path()).unwrap().count(), 1);
        let done = f.mock.sent_matching("PRIVMSG #support-logging :Support conversation");
        assert!(done[0].ends_with(
            "complete. I could not properly upload the logs, but they should be saved locally."
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstarted_end_skips_archive() {
        let f = fixture().await;
        let cleanups = Arc::new(AtomicUsize::new(0));
        let session = Session::new(
            f.ctx.clone(),
            "#s1",
            "mod",
            "alice",
            "help",
            vec![counting_cleanup(&cleanups)],
        );
        session.end_session().await;
        assert_eq!(f.api.paste_count(), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(f.logs.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_cleanup_does_not_block_others() {
        let f = fixture().await;
        let cleanups = Arc::new(AtomicUsize::new(0));
        let session = Session::new(
            f.ctx.clone(),
            "#s1",
            "mod",
            "alice",
            "help",
            vec![
                Cleanup::callback(|| async { Err(anyhow::anyhow!("boom")) }),
                counting_cleanup(&cleanups),
            ],
        );
        session.end_session().await;
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_session_stops_listening() {
        let f = fixture().await;
        let session = started(&f, vec![]).await;
        session.end_session().await;
        let before = session.transcript().len();
        f.mock.emit(TransportEvent::Message {
            nick: "alice".into(),
            ident: "alice".into(),
            hostname: "user.example".into(),
            target: "#s1".into(),
            text: "anyone there?".into(),
        });
        settle().await;
        assert_eq!(session.transcript().len(), before);
        assert!(!f.store.contains(&session.key()));
    }

    // ========================================================================
    // Rehydration
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_from_state_is_started_and_logs_reconnect() {
        let f = fixture().await;
        let snapshot = SessionSnapshot {
            chan: "#s2".into(),
            staff: "mod".into(),
            user: "alice".into(),
            reason: "help".into(),
            time: Utc::now(),
            color: "teal".into(),
            log: vec!["2024-01-01 00:00:00 UTC | earlier".into()],
        };
        let session = Session::from_state(f.ctx.clone(), snapshot, vec![])
            .await
            .unwrap();
        assert!(session.is_started());
        assert!(!session.is_ended());
        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[1].ends_with("| --- Reconnected to IRC ---"));
        let stored: SessionSnapshot = get_json(f.store.as_ref(), "session::#s2").await.unwrap();
        assert_eq!(stored.log.len(), 2);
    }

    #[test]
    fn passphrases_are_alphanumeric() {
        let p = random_passphrase();
        assert_eq!(p.len(), PASSPHRASE_LEN);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
