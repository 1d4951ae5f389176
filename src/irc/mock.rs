//! Scripted in-process transport for tests.
//!
//! Records every line sent and plays the server's part for the commands the
//! bot relies on: OPER is confirmed with 381, SAJOIN of the bot yields a
//! roster, SAJOIN/SAPART/KICK of others yield JOIN/PART/KICK.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

use super::event::{TransportEvent, WhoUser, WhoisUser};
use super::transport::{ConnectParams, Transport};
use super::wire::Line;
use crate::error::TransportError;

#[derive(Default)]
struct MockInner {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    nick: String,
    sent: Vec<String>,
    connects: usize,
    refuse_connect: bool,
    refuse_oper: bool,
    rosters: HashMap<String, Vec<String>>,
    whois: HashMap<String, WhoisUser>,
    who: HashMap<String, Vec<WhoUser>>,
    ignored_joins: HashSet<String>,
    hung_whois: HashSet<String>,
    who_delays: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct MockTransport {
    inner: Mutex<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event as if the server sent it.
    pub fn emit(&self, event: TransportEvent) {
        if let Some(tx) = &self.inner.lock().events {
            let _ = tx.send(event);
        }
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        let tx = self.inner.lock().events.take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Closed);
        }
    }

    /// Every line sent so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    /// Sent lines starting with `prefix`.
    pub fn sent_matching(&self, prefix: &str) -> Vec<String> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|l| l.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().sent.clear();
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.inner.lock().refuse_connect = refuse;
    }

    /// Answer OPER with 491 instead of 381.
    pub fn refuse_oper(&self, refuse: bool) {
        self.inner.lock().refuse_oper = refuse;
    }

    /// Occupants (besides the bot) reported when the bot joins `channel`.
    pub fn set_roster(&self, channel: &str, nicks: &[&str]) {
        self.inner.lock().rosters.insert(
            channel.to_lowercase(),
            nicks.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn set_whois(&self, user: WhoisUser) {
        self.inner
            .lock()
            .whois
            .insert(user.nick.to_lowercase(), user);
    }

    pub fn set_who(&self, target: &str, users: Vec<WhoUser>) {
        self.inner.lock().who.insert(target.to_lowercase(), users);
    }

    /// SAJOINs of `nick` will not produce a JOIN.
    pub fn ignore_joins_of(&self, nick: &str) {
        self.inner.lock().ignored_joins.insert(nick.to_lowercase());
    }

    /// WHOIS of `nick` never answers.
    pub fn hang_whois(&self, nick: &str) {
        self.inner.lock().hung_whois.insert(nick.to_lowercase());
    }

    /// WHO of `target` answers only after `delay`.
    pub fn delay_who(&self, target: &str, delay: Duration) {
        self.inner
            .lock()
            .who_delays
            .insert(target.to_lowercase(), delay);
    }

    fn react(&self, line: &Line) {
        let mut inner = self.inner.lock();
        let Some(tx) = inner.events.clone() else {
            return;
        };
        let reply = |event| {
            let _ = tx.send(event);
        };
        match line.command.as_str() {
            "OPER" => {
                let code = if inner.refuse_oper { 491 } else { 381 };
                reply(TransportEvent::Numeric {
                    code,
                    params: vec![inner.nick.clone()],
                });
            }
            "SAJOIN" => {
                let (nick, channel) = (line.param(0), line.param(1));
                if nick.eq_ignore_ascii_case(&inner.nick) {
                    let mut nicks = inner
                        .rosters
                        .get(&channel.to_lowercase())
                        .cloned()
                        .unwrap_or_default();
                    nicks.push(inner.nick.clone());
                    reply(TransportEvent::UserList {
                        channel: channel.to_string(),
                        nicks,
                    });
                } else if !inner.ignored_joins.contains(&nick.to_lowercase()) {
                    reply(TransportEvent::Join {
                        channel: channel.to_string(),
                        nick: nick.to_string(),
                    });
                }
            }
            "SAPART" => reply(TransportEvent::Part {
                channel: line.param(1).to_string(),
                nick: line.param(0).to_string(),
            }),
            "KICK" => reply(TransportEvent::Kick {
                channel: line.param(0).to_string(),
                nick: line.param(1).to_string(),
            }),
            "NICK" => {
                inner.nick = line.param(0).to_string();
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        let mut inner = self.inner.lock();
        inner.connects += 1;
        if inner.refuse_connect {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.nick = params.nick.clone();
        let _ = tx.send(TransportEvent::Registered {
            nick: params.nick.clone(),
        });
        inner.events = Some(tx);
        Ok(rx)
    }

    fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.lock();
            if inner.events.is_none() {
                return Err(TransportError::NotConnected);
            }
            inner.sent.push(line.to_string());
        }
        if let Some(parsed) = Line::parse(line) {
            self.react(&parsed);
        }
        Ok(())
    }

    async fn who(&self, target: &str) -> Result<Vec<WhoUser>, TransportError> {
        let delay = {
            let inner = self.inner.lock();
            if inner.events.is_none() {
                return Err(TransportError::NotConnected);
            }
            inner.who_delays.get(&target.to_lowercase()).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let inner = self.inner.lock();
        Ok(inner
            .who
            .get(&target.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn whois(&self, nick: &str) -> Result<WhoisUser, TransportError> {
        let hung = {
            let inner = self.inner.lock();
            if inner.events.is_none() {
                return Err(TransportError::NotConnected);
            }
            inner.hung_whois.contains(&nick.to_lowercase())
        };
        if hung {
            std::future::pending::<()>().await;
        }
        let inner = self.inner.lock();
        Ok(inner
            .whois
            .get(&nick.to_lowercase())
            .cloned()
            .unwrap_or_else(|| WhoisUser {
                nick: nick.to_string(),
                ident: nick.to_lowercase(),
                hostname: "user.example".to_string(),
                actual_ip: None,
            }))
    }

    async fn quit(&self, message: &str) {
        let tx = {
            let mut inner = self.inner.lock();
            inner.sent.push(format!("QUIT :{message}"));
            inner.events.take()
        };
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Closed);
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().events.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "localhost".into(),
            port: 6667,
            tls: false,
            verify_tls: true,
            nick: "renge".into(),
            username: "renge".into(),
            realname: "renge".into(),
        }
    }

    #[tokio::test]
    async fn test_connect_registers_and_oper_confirms() {
        let mock = MockTransport::new();
        let mut rx = mock.connect(&params()).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Registered {
                nick: "renge".into()
            })
        );
        mock.send_raw("OPER oper pass").unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Numeric {
                code: 381,
                params: vec!["renge".into()]
            })
        );
    }

    #[tokio::test]
    async fn test_sajoin_self_yields_roster() {
        let mock = MockTransport::new();
        mock.set_roster("#s1", &["stray"]);
        let mut rx = mock.connect(&params()).await.unwrap();
        rx.recv().await;
        mock.send_raw("SAJOIN renge #s1").unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::UserList {
                channel: "#s1".into(),
                nicks: vec!["stray".into(), "renge".into()],
            })
        );
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let mock = MockTransport::new();
        assert_eq!(
            mock.send_raw("PRIVMSG #a :hi"),
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_quit_closes_stream() {
        let mock = MockTransport::new();
        let mut rx = mock.connect(&params()).await.unwrap();
        rx.recv().await;
        mock.quit("bye").await;
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
        assert_eq!(rx.recv().await, None);
        assert!(!mock.is_connected());
    }
}
