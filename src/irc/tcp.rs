//! Line-based TCP/TLS transport.
//!
//! Handles registration, PING, NAMES collection and WHO/WHOIS bookkeeping;
//! everything else is turned into [`TransportEvent`]s for the facade.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, trace, warn};

use super::event::{TransportEvent, WhoUser, WhoisUser};
use super::tls::{IrcStream, upgrade_to_tls};
use super::transport::{ConnectParams, Transport};
use super::wire::{Line, Prefix, format_line};
use crate::error::TransportError;

const MAX_LINE_LENGTH: usize = 8192;

/// Roster prefixes stripped from NAMES replies.
const NICK_PREFIXES: &[char] = &['~', '&', '@', '%', '+'];

struct PendingWho {
    target: String,
    users: Vec<WhoUser>,
    reply: oneshot::Sender<Result<Vec<WhoUser>, TransportError>>,
}

struct PendingWhois {
    user: WhoisUser,
    reply: oneshot::Sender<Result<WhoisUser, TransportError>>,
}

#[derive(Default)]
struct Queries {
    who: VecDeque<PendingWho>,
    whois: VecDeque<PendingWhois>,
}

impl Queries {
    fn fail_all(&mut self) {
        for pending in self.who.drain(..) {
            let _ = pending.reply.send(Err(TransportError::Closed));
        }
        for pending in self.whois.drain(..) {
            let _ = pending.reply.send(Err(TransportError::Closed));
        }
    }

    fn whois_for(&mut self, nick: &str) -> Option<&mut PendingWhois> {
        self.whois
            .iter_mut()
            .find(|p| p.user.nick.eq_ignore_ascii_case(nick))
    }

    fn take_whois(&mut self, nick: &str) -> Option<PendingWhois> {
        let pos = self
            .whois
            .iter()
            .position(|p| p.user.nick.eq_ignore_ascii_case(nick))?;
        self.whois.remove(pos)
    }
}

#[derive(Clone)]
struct Connection {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
    queries: Arc<Mutex<Queries>>,
}

/// Plain TCP or TLS IRC connection.
#[derive(Default)]
pub struct TcpTransport {
    slot: Arc<Mutex<Option<Connection>>>,
    next_id: AtomicU64,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self) -> Result<Connection, TransportError> {
        self.slot.lock().clone().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        // Drop any previous connection; its task ends once the sender is gone.
        self.slot.lock().take();

        let tcp_stream = TcpStream::connect((params.host.as_str(), params.port))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let stream = if params.tls {
            upgrade_to_tls(tcp_stream, &params.host, params.verify_tls).await?
        } else {
            IrcStream::Plain(tcp_stream)
        };
        if stream.is_tls() && !params.verify_tls {
            warn!("Connection was established on secure channel without TLS peer verification");
        }

        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let register = [
            format_line("NICK", &[&params.nick]),
            format_line("USER", &[&params.username, "0", "*", &params.realname]),
        ];
        for line in register {
            framed
                .send(line)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queries = Arc::new(Mutex::new(Queries::default()));
        *self.slot.lock() = Some(Connection {
            id,
            outbound: outbound_tx,
            queries: queries.clone(),
        });

        let slot = self.slot.clone();
        tokio::spawn(async move {
            run_connection(framed, outbound_rx, events_tx.clone(), queries.clone()).await;
            {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|c| c.id == id) {
                    *slot = None;
                }
            }
            queries.lock().fail_all();
            let _ = events_tx.send(TransportEvent::Closed);
            info!(connection = id, "IRC connection closed");
        });

        Ok(events_rx)
    }

    fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        let conn = self.connection()?;
        trace!(line = %line, "Sending");
        conn.outbound
            .send(line.to_string())
            .map_err(|_| TransportError::Closed)
    }

    async fn who(&self, target: &str) -> Result<Vec<WhoUser>, TransportError> {
        let conn = self.connection()?;
        let (tx, rx) = oneshot::channel();
        conn.queries.lock().who.push_back(PendingWho {
            target: target.to_string(),
            users: Vec::new(),
            reply: tx,
        });
        conn.outbound
            .send(format_line("WHO", &[target]))
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    async fn whois(&self, nick: &str) -> Result<WhoisUser, TransportError> {
        let conn = self.connection()?;
        let (tx, rx) = oneshot::channel();
        conn.queries.lock().whois.push_back(PendingWhois {
            user: WhoisUser {
                nick: nick.to_string(),
                ..WhoisUser::default()
            },
            reply: tx,
        });
        conn.outbound
            .send(format_line("WHOIS", &[nick]))
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    async fn quit(&self, message: &str) {
        let conn = self.slot.lock().take();
        if let Some(conn) = conn {
            let _ = conn.outbound.send(format_line("QUIT", &[message]));
        }
    }

    fn is_connected(&self) -> bool {
        self.slot.lock().is_some()
    }
}

async fn run_connection(
    mut framed: Framed<IrcStream, LinesCodec>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    queries: Arc<Mutex<Queries>>,
) {
    let mut names: HashMap<String, Vec<String>> = HashMap::new();

    loop {
        tokio::select! {
            incoming = framed.next() => {
                let raw = match incoming {
                    Some(Ok(raw)) => raw,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        warn!("Dropping overlong line from server");
                        continue;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "IRC read error");
                        break;
                    }
                    None => break,
                };
                trace!(line = %raw, "Received");
                let Some(line) = Line::parse(&raw) else { continue };

                if line.command == "PING" {
                    if let Err(e) = framed.send(format_line("PONG", &[line.param(0)])).await {
                        error!(error = %e, "Failed to answer PING");
                        break;
                    }
                    continue;
                }

                let translated = translate(&line, &mut names, &mut queries.lock());
                for event in translated {
                    if events.send(event).is_err() {
                        debug!("Event receiver dropped");
                    }
                }
            }
            out = outbound.recv() => {
                let Some(out) = out else { break };
                if let Err(e) = framed.send(out).await {
                    error!(error = %e, "IRC write error");
                    break;
                }
            }
        }
    }
}

/// Turn one line into zero or more events, feeding WHO/WHOIS/NAMES state.
fn translate(
    line: &Line,
    names: &mut HashMap<String, Vec<String>>,
    queries: &mut Queries,
) -> Vec<TransportEvent> {
    let nick = line.source_nick().to_string();

    if let Some(code) = line.numeric() {
        match code {
            1 => {
                return vec![TransportEvent::Registered {
                    nick: line.param(0).to_string(),
                }];
            }
            // RPL_NAMREPLY: <me> <symbol> <channel> :<nicks>
            353 => {
                let roster = names.entry(line.param(2).to_lowercase()).or_default();
                roster.extend(
                    line.param(3)
                        .split(' ')
                        .map(|n| n.trim_start_matches(NICK_PREFIXES))
                        .filter(|n| !n.is_empty())
                        .map(str::to_string),
                );
            }
            // RPL_ENDOFNAMES: <me> <channel>
            366 => {
                let channel = line.param(1).to_string();
                let nicks = names.remove(&channel.to_lowercase()).unwrap_or_default();
                return vec![TransportEvent::UserList { channel, nicks }];
            }
            // RPL_WHOREPLY: <me> <channel> <user> <host> <server> <nick> <flags> :<hops> <realname>
            352 => {
                if let Some(pending) = queries.who.front_mut() {
                    pending.users.push(WhoUser {
                        nick: line.param(5).to_string(),
                        ident: line.param(2).to_string(),
                        hostname: line.param(3).to_string(),
                        channel_modes: channel_modes(line.param(6)),
                    });
                }
            }
            // RPL_ENDOFWHO: <me> <target>
            315 => {
                let target = line.param(1);
                if let Some(pos) = queries
                    .who
                    .iter()
                    .position(|p| p.target.eq_ignore_ascii_case(target))
                    && let Some(pending) = queries.who.remove(pos)
                {
                    let _ = pending.reply.send(Ok(pending.users));
                }
            }
            // RPL_WHOISUSER: <me> <nick> <user> <host> * :<realname>
            311 => {
                if let Some(pending) = queries.whois_for(line.param(1)) {
                    pending.user.nick = line.param(1).to_string();
                    pending.user.ident = line.param(2).to_string();
                    pending.user.hostname = line.param(3).to_string();
                }
            }
            // RPL_WHOISACTUALLY: <me> <nick> [user@host] <ip> :actually using host
            338 => {
                let ip = line.params.iter().skip(2).find_map(|p| parse_ip(p));
                if let Some(pending) = queries.whois_for(line.param(1))
                    && let Some(ip) = ip
                {
                    pending.user.actual_ip = Some(ip);
                }
            }
            // RPL_WHOISHOST: <me> <nick> :is connecting from *@<host> <ip>
            378 => {
                let ip = line.params.last().and_then(|t| t.split(' ').find_map(parse_ip));
                if let Some(pending) = queries.whois_for(line.param(1))
                    && pending.user.actual_ip.is_none()
                {
                    pending.user.actual_ip = ip;
                }
            }
            // RPL_ENDOFWHOIS
            318 => {
                if let Some(pending) = queries.take_whois(line.param(1)) {
                    let _ = pending.reply.send(Ok(pending.user));
                }
            }
            // ERR_NOSUCHNICK
            401 => {
                let target = line.param(1);
                if let Some(pending) = queries.take_whois(target) {
                    let _ = pending
                        .reply
                        .send(Err(TransportError::NoSuchTarget(target.to_string())));
                }
            }
            _ => {
                return vec![TransportEvent::Numeric {
                    code,
                    params: line.params.clone(),
                }];
            }
        }
        return Vec::new();
    }

    let event = match line.command.as_str() {
        "JOIN" => TransportEvent::Join {
            channel: line.param(0).to_string(),
            nick,
        },
        "PART" => TransportEvent::Part {
            channel: line.param(0).to_string(),
            nick,
        },
        "KICK" => TransportEvent::Kick {
            channel: line.param(0).to_string(),
            nick: line.param(1).to_string(),
        },
        "QUIT" => TransportEvent::Quit { nick },
        "NICK" => TransportEvent::Nick {
            old: nick,
            new: line.param(0).to_string(),
        },
        "PRIVMSG" => {
            let text = line.param(1);
            // CTCP
            if text.starts_with('\x01') {
                return Vec::new();
            }
            let (ident, hostname) = match &line.prefix {
                Some(Prefix::Nickname(_, user, host)) => (user.clone(), host.clone()),
                _ => (String::new(), String::new()),
            };
            TransportEvent::Message {
                nick,
                ident,
                hostname,
                target: line.param(0).to_string(),
                text: text.to_string(),
            }
        }
        "ERROR" => {
            warn!(reason = %line.param(0), "Server sent ERROR");
            return Vec::new();
        }
        _ => return Vec::new(),
    };
    vec![event]
}

fn channel_modes(flags: &str) -> Vec<char> {
    flags
        .chars()
        .filter_map(|c| match c {
            '~' => Some('q'),
            '&' => Some('a'),
            '@' => Some('o'),
            '%' => Some('h'),
            '+' => Some('v'),
            _ => None,
        })
        .collect()
}

fn parse_ip(word: &str) -> Option<String> {
    let candidate = word.rsplit('@').next().unwrap_or(word);
    candidate.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
