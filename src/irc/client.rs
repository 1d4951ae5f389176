//! IRC client facade.
//!
//! Owns the connection lifecycle and channel membership, and fans transport
//! events out to subscribers. Everything above this layer talks IRC through
//! an [`IrcClient`].

use parking_lot::Mutex;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use super::event::{
    ChannelMessage, LeaveKind, NickChanged, Tap, TransportEvent, UserJoined, UserLeft, WhoUser,
    WhoisUser,
};
use super::handlers::{HandlerList, Subscription};
use super::hostmask::matches_hostmask;
use super::membership::ChannelState;
use super::transport::{ConnectParams, Transport};
use super::wire::format_line;
use crate::config::{ChannelsConfig, Config, OperConfig};
use crate::error::IrcError;

const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const WHO_TIMEOUT: Duration = Duration::from_secs(10);
const WHOIS_TIMEOUT: Duration = Duration::from_secs(2);

const RPL_YOUREOPER: u16 = 381;
const ERR_NICKNAMEINUSE: u16 = 433;
const ERR_NOOPERHOST: u16 = 491;

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Disconnected,
    /// Connected (or connecting) without operator privileges yet.
    Connecting,
    /// Operator privileges granted; main channels may still be joining.
    Registered,
    /// All channels joined and connect handlers fired.
    Joined,
}

pub struct IrcClient {
    transport: Arc<dyn Transport>,
    params: ConnectParams,
    oper: OperConfig,
    channels: ChannelsConfig,
    vhost: String,
    nick: Mutex<String>,
    state: Mutex<ChannelState>,
    phase: watch::Sender<Phase>,
    /// Set once the server welcomed the current connection.
    welcomed: AtomicBool,
    generation: AtomicU64,
    join_handlers: Arc<HandlerList<UserJoined>>,
    leave_handlers: Arc<HandlerList<UserLeft>>,
    rename_handlers: Arc<HandlerList<NickChanged>>,
    connect_handlers: Arc<HandlerList<()>>,
    disconnect_handlers: Arc<HandlerList<()>>,
    message_hooks: Arc<HandlerList<ChannelMessage>>,
    taps: broadcast::Sender<Tap>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl IrcClient {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Arc<Self> {
        let (phase, _) = watch::channel(Phase::Disconnected);
        let (taps, _) = broadcast::channel(256);
        Arc::new(Self {
            transport,
            params: ConnectParams::from(&config.irc),
            oper: config.oper.clone(),
            channels: config.channels.clone(),
            vhost: config.irc.vhost.clone(),
            nick: Mutex::new(config.irc.nick.clone()),
            state: Mutex::new(ChannelState::new()),
            phase,
            welcomed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            join_handlers: HandlerList::new(),
            leave_handlers: HandlerList::new(),
            rename_handlers: HandlerList::new(),
            connect_handlers: HandlerList::new(),
            disconnect_handlers: HandlerList::new(),
            message_hooks: HandlerList::new(),
            taps,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    // ========================================================================
    // State queries
    // ========================================================================

    pub fn nick(&self) -> String {
        self.nick.lock().clone()
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.nick.lock().eq_ignore_ascii_case(nick)
    }

    pub fn channels(&self) -> &ChannelsConfig {
        &self.channels
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn is_registered(&self) -> bool {
        self.phase() >= Phase::Registered
    }

    pub fn is_joined(&self) -> bool {
        self.phase() == Phase::Joined
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn is_in_channel(&self, channel: &str) -> bool {
        self.state.lock().is_in_channel(channel)
    }

    pub fn is_user_in_channel(&self, channel: &str, nick: &str) -> bool {
        self.state.lock().is_user_in_channel(channel, nick)
    }

    /// Lower-cased nicks currently in `channel`.
    pub fn users_in(&self, channel: &str) -> Vec<String> {
        self.state.lock().users_in(channel)
    }

    /// Tracker for every handler task spawned on behalf of this client.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Spawn a tracked background task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    fn check_registered(&self) -> Result<(), IrcError> {
        if self.is_registered() {
            Ok(())
        } else {
            Err(IrcError::NotRegistered)
        }
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Keep the bot connected until [`shut_down`](Self::shut_down).
    ///
    /// Every few seconds, if operator registration has not completed, the
    /// current connection attempt is dropped and a new one started.
    pub async fn run_connect_loop(self: Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            if !self.is_registered() {
                self.connect_once().await;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(RECONNECT_INTERVAL) => {}
            }
        }
        debug!("Connect loop stopped");
    }

    async fn connect_once(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.transport.is_connected() {
            self.transport.quit("Reconnecting").await;
        }
        self.welcomed.store(false, Ordering::SeqCst);
        self.state.lock().on_disconnect();
        self.phase.send_replace(Phase::Connecting);

        info!(
            server = %self.params.host,
            port = self.params.port,
            tls = self.params.tls,
            "Attempting to connect to IRC"
        );
        match self.transport.connect(&self.params).await {
            Ok(events) => {
                let client = self.clone();
                tokio::spawn(async move { client.dispatch_loop(generation, events).await });
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to IRC");
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.phase.send_replace(Phase::Disconnected);
                }
            }
        }
    }

    /// Stop reconnecting and quit the current connection.
    pub async fn shut_down(&self) {
        self.shutdown.cancel();
        self.transport.quit("Shutting down").await;
    }

    /// Resolve once all channels are joined after registration.
    pub async fn wait_until_joined(&self) {
        let mut rx = self.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == Phase::Joined).await;
    }

    /// Operator privileges granted: set modes, join every channel, fire
    /// connect handlers.
    async fn post_oper(self: Arc<Self>) {
        debug!("Oper privileges gained");
        self.phase.send_replace(Phase::Registered);
        if let Err(e) = self.join_all().await {
            error!(error = %e, code = e.error_code(), "Failed to set up channels, reconnecting");
            self.transport.quit("Channel setup failed").await;
            return;
        }
        self.fire(&self.connect_handlers, (), "connect");
        self.phase.send_replace(Phase::Joined);
        info!("Joined all channels");
    }

    async fn join_all(&self) -> Result<(), IrcError> {
        let me = self.nick();
        self.raw_command(&["MODE", &me, "+B"])?;
        self.raw_command(&["CHGHOST", &me, &self.vhost])?;
        for channel in self.channels.main_channels() {
            self.join_channel(channel).await?;
        }
        for channel in &self.channels.sessions {
            self.join_channel(channel).await?;
            self.set_up_session_channel(channel)?;
        }
        Ok(())
    }

    /// Op the bot and lock a session channel down to invited staff.
    pub fn set_up_session_channel(&self, channel: &str) -> Result<(), IrcError> {
        let me = self.nick();
        self.raw_command(&["SAMODE", channel, "+o", &me])?;
        self.raw_command(&["MODE", channel, "+ins"])?;
        for mask in &self.channels.staff_hostmasks {
            self.raw_command(&["MODE", channel, "+I", mask])?;
        }
        Ok(())
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    async fn dispatch_loop(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Dropping events of a replaced connection");
                return;
            }
            let closed = matches!(event, TransportEvent::Closed);
            self.handle_event(event);
            if closed {
                return;
            }
        }
        if self.generation.load(Ordering::SeqCst) == generation {
            self.handle_disconnect();
        }
    }

    fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Registered { nick } => {
                info!(nick = %nick, "Successfully connected to IRC server");
                *self.nick.lock() = nick;
                self.welcomed.store(true, Ordering::SeqCst);
                let line = format_line("OPER", &[&self.oper.username, &self.oper.password]);
                if let Err(e) = self.transport.send_raw(&line) {
                    error!(error = %e, "Failed to send OPER");
                }
            }
            TransportEvent::Numeric { code, params } => match code {
                RPL_YOUREOPER => {
                    let client = self.clone();
                    self.tracker.spawn(client.post_oper());
                }
                ERR_NOOPERHOST => {
                    error!("Registering as oper has failed; possibly bad O:LINE password?");
                }
                ERR_NICKNAMEINUSE => {
                    error!(nick = %self.params.nick, "Attempted nickname is currently in use; will retry");
                }
                _ => trace!(code, ?params, "Unhandled numeric"),
            },
            TransportEvent::UserList { channel, nicks } => {
                self.state.lock().on_user_list(&channel, &nicks);
                info!(channel = %channel, users = nicks.len(), "Joined channel");
                let _ = self.taps.send(Tap::UserList { channel });
            }
            TransportEvent::Join { channel, nick } => self.handle_join(channel, nick),
            TransportEvent::Part { channel, nick } => {
                self.handle_channel_leave(channel, nick, LeaveKind::Parted)
            }
            TransportEvent::Kick { channel, nick } => {
                self.handle_channel_leave(channel, nick, LeaveKind::Kicked)
            }
            TransportEvent::Quit { nick } => {
                debug!(nick = %nick, "User quit");
                let channels = self.state.lock().on_quit(&nick);
                for channel in channels {
                    self.fire(
                        &self.leave_handlers,
                        UserLeft {
                            channel,
                            nick: nick.clone(),
                            kind: LeaveKind::Quit,
                        },
                        "leave",
                    );
                }
            }
            TransportEvent::Nick { old, new } => {
                debug!(old = %old, new = %new, "Nick change");
                self.state.lock().on_nick_change(&old, &new);
                if self.is_me(&old) {
                    *self.nick.lock() = new.clone();
                }
                self.fire(&self.rename_handlers, NickChanged { old, new }, "rename");
            }
            TransportEvent::Message {
                nick,
                ident,
                hostname,
                target,
                text,
            } => {
                if !target.starts_with(['#', '&']) {
                    trace!(nick = %nick, "Ignoring private message");
                    return;
                }
                self.fire(
                    &self.message_hooks,
                    ChannelMessage {
                        channel: target,
                        nick,
                        ident,
                        hostname,
                        text,
                    },
                    "message",
                );
            }
            TransportEvent::Closed => self.handle_disconnect(),
        }
    }

    fn handle_join(self: &Arc<Self>, channel: String, nick: String) {
        if self.is_me(&nick) {
            return;
        }
        debug!(nick = %nick, channel = %channel, "User joined");
        self.state.lock().on_join(&channel, &nick);
        let _ = self.taps.send(Tap::Join {
            channel: channel.clone(),
            nick: nick.clone(),
        });
        self.fire(&self.join_handlers, UserJoined { channel, nick }, "join");
    }

    fn handle_channel_leave(self: &Arc<Self>, channel: String, nick: String, kind: LeaveKind) {
        if self.is_me(&nick) {
            warn!(channel = %channel, kind = %kind, "Unexpectedly left channel");
            self.state.lock().remove_channel(&channel);
            if self.channels.is_managed(&channel) && !self.is_shutting_down() {
                let client = self.clone();
                self.tracker.spawn(async move {
                    if let Err(e) = client.join_channel(&channel).await {
                        error!(channel = %channel, error = %e, "Failed to rejoin channel");
                    }
                });
            }
            return;
        }
        debug!(nick = %nick, channel = %channel, kind = %kind, "User left");
        if self.state.lock().on_leave(&channel, &nick) {
            self.fire(&self.leave_handlers, UserLeft { channel, nick, kind }, "leave");
        }
    }

    fn handle_disconnect(&self) {
        let previous = self.phase.send_replace(Phase::Disconnected);
        self.state.lock().on_disconnect();
        if !self.welcomed.swap(false, Ordering::SeqCst) {
            return;
        }
        if !self.is_shutting_down() {
            error!(previous = ?previous, "Disconnected from IRC server!");
        }
        self.fire(&self.disconnect_handlers, (), "disconnect");
    }

    /// Call every handler of a category in registration order, then run the
    /// futures they return as tracked tasks. Failures are logged per handler.
    ///
    /// The calls happen on the dispatch loop, so whatever a handler does
    /// before returning its future sees events in arrival order. Anything
    /// after its first await may interleave with later events.
    fn fire<A: Clone + Send + 'static>(
        &self,
        list: &HandlerList<A>,
        arg: A,
        category: &'static str,
    ) {
        for handler in list.snapshot() {
            let fut = handler(arg.clone());
            self.tracker.spawn(async move {
                if let Err(e) = fut.await {
                    warn!(category, error = %e, "Event handler failed");
                }
            });
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Send a raw command. The last argument is sent as a trailing parameter
    /// when needed.
    pub fn raw_command(&self, args: &[&str]) -> Result<(), IrcError> {
        self.check_registered()?;
        let Some((command, rest)) = args.split_first() else {
            return Ok(());
        };
        let line = format_line(command, rest);
        trace!(line = %line, "Raw command");
        self.transport.send_raw(&line)?;
        Ok(())
    }

    /// PRIVMSG, one line per `\n`.
    pub fn message(&self, target: &str, text: &str) -> Result<(), IrcError> {
        self.check_registered()?;
        trace!(target = %target, text = %text, "Sending message");
        for line in text.split('\n') {
            self.transport
                .send_raw(&format!("PRIVMSG {target} :{line}"))?;
        }
        Ok(())
    }

    /// NOTICE, one line per `\n`.
    pub fn notice(&self, target: &str, text: &str) -> Result<(), IrcError> {
        self.check_registered()?;
        trace!(target = %target, text = %text, "Sending notice");
        for line in text.split('\n') {
            self.transport.send_raw(&format!("NOTICE {target} :{line}"))?;
        }
        Ok(())
    }

    /// Force-join the bot into `channel` and wait for its roster.
    pub async fn join_channel(&self, channel: &str) -> Result<(), IrcError> {
        if self.is_in_channel(channel) {
            return Ok(());
        }
        let mut taps = self.taps.subscribe();
        let me = self.nick();
        self.raw_command(&["SAJOIN", &me, channel])?;

        let joined = async {
            loop {
                match taps.recv().await {
                    Ok(Tap::UserList { channel: c }) if c.eq_ignore_ascii_case(channel) => {
                        return true;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if self.is_in_channel(channel) {
                            return true;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        };
        match timeout(JOIN_TIMEOUT, joined).await {
            Ok(true) => Ok(()),
            _ => Err(IrcError::ChannelJoinTimeout(channel.to_string())),
        }
    }

    /// Force-join another user into a channel the bot is in, and wait for
    /// their JOIN.
    pub async fn join_user_to_channel(&self, channel: &str, nick: &str) -> Result<(), IrcError> {
        if self.is_me(nick) {
            return Err(IrcError::JoinSelf);
        }
        if !self.is_in_channel(channel) {
            return Err(IrcError::NotInChannel(channel.to_string()));
        }
        if self.is_user_in_channel(channel, nick) {
            return Ok(());
        }
        let mut taps = self.taps.subscribe();
        self.raw_command(&["SAJOIN", nick, channel])?;

        let joined = async {
            loop {
                match taps.recv().await {
                    Ok(Tap::Join {
                        channel: c,
                        nick: n,
                    }) if c.eq_ignore_ascii_case(channel) && n.eq_ignore_ascii_case(nick) => {
                        return true;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if self.is_user_in_channel(channel, nick) {
                            return true;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        };
        match timeout(JOIN_TIMEOUT, joined).await {
            Ok(true) => Ok(()),
            _ => Err(IrcError::UserJoinTimeout {
                channel: channel.to_string(),
                nick: nick.to_string(),
            }),
        }
    }

    /// Blind SAPART.
    pub fn part_user_from_channel(&self, channel: &str, nick: &str) -> Result<(), IrcError> {
        self.raw_command(&["SAPART", nick, channel])
    }

    /// Blind KICK.
    pub fn kick_user_from_channel(&self, channel: &str, nick: &str) -> Result<(), IrcError> {
        self.raw_command(&["KICK", channel, nick])
    }

    pub async fn who(&self, target: &str) -> Result<Vec<WhoUser>, IrcError> {
        self.check_registered()?;
        match timeout(WHO_TIMEOUT, self.transport.who(target)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IrcError::WhoTimeout(target.to_string())),
        }
    }

    pub async fn whois(&self, nick: &str) -> Result<WhoisUser, IrcError> {
        self.check_registered()?;
        match timeout(WHOIS_TIMEOUT, self.transport.whois(nick)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IrcError::WhoisTimeout(nick.to_string())),
        }
    }

    /// Whether `nick` matches one of the configured staff hostmasks.
    pub async fn is_staff(&self, nick: &str) -> Result<bool, IrcError> {
        let user = self.whois(nick).await?;
        Ok(self
            .channels
            .staff_hostmasks
            .iter()
            .any(|mask| matches_hostmask(mask, &user.nick, &user.ident, &user.hostname)))
    }

    /// Whether `nick` holds `+o` in `channel`.
    pub async fn is_channel_op(&self, channel: &str, nick: &str) -> Result<bool, IrcError> {
        let users = self.who(channel).await?;
        Ok(users
            .iter()
            .find(|u| u.nick.eq_ignore_ascii_case(nick))
            .is_some_and(|u| u.channel_modes.contains(&'o')))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn add_join_handler<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(UserJoined) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.join_handlers.add(handler)
    }

    pub fn add_leave_handler<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(UserLeft) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.leave_handlers.add(handler)
    }

    pub fn add_rename_handler<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(NickChanged) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rename_handlers.add(handler)
    }

    pub fn add_connect_handler<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(()) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.connect_handlers.add(handler)
    }

    pub fn add_disconnect_handler<F, Fut>(&self, handler: F) -> Subscription
    where
        F: Fn(()) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.disconnect_handlers.add(handler)
    }

    /// Run `handler` for messages in `channel` matching `pattern`.
    pub fn add_message_hook<F, Fut>(&self, channel: &str, pattern: Regex, handler: F) -> Subscription
    where
        F: Fn(ChannelMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let channel = channel.to_string();
        self.message_hooks.add(move |msg: ChannelMessage| {
            let matched =
                msg.channel.eq_ignore_ascii_case(&channel) && pattern.is_match(&msg.text);
            let fut = matched.then(|| handler(msg));
            async move {
                match fut {
                    Some(fut) => fut.await,
                    None => Ok(()),
                }
            }
        })
    }
}
