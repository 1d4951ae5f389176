//! Fixtures shared by unit tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{AccountApi, ReEnableResponse};
use crate::bot::Bot;
use crate::config::{Config, StorageBackend};
use crate::error::ApiError;
use crate::irc::{IrcClient, MockTransport, TransportEvent, WhoisUser};
use crate::store::MemoryStore;

/// Two session channels, staff identified by host `staff.example`.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.channels.sessions = vec!["#s1".into(), "#s2".into()];
    config.channels.staff_hostmasks = vec!["*!*@staff.example".into()];
    config.storage.backend = StorageBackend::Memory;
    config
}

/// A client that has not connected yet.
pub(crate) fn client(config: &Config) -> (Arc<IrcClient>, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let client = IrcClient::new(mock.clone(), config);
    (client, mock)
}

/// Start the connect loop and wait until every channel is joined.
pub(crate) async fn connect(client: &Arc<IrcClient>) {
    tokio::spawn(client.clone().run_connect_loop());
    client.wait_until_joined().await;
    settle().await;
}

pub(crate) async fn connected(config: &Config) -> (Arc<IrcClient>, Arc<MockTransport>) {
    let (client, mock) = client(config);
    connect(&client).await;
    (client, mock)
}

/// Let spawned handler tasks run.
pub(crate) async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Register `nick` as staff on the mock server.
pub(crate) fn make_staff(mock: &MockTransport, nick: &str) {
    mock.set_whois(WhoisUser {
        nick: nick.to_string(),
        ident: nick.to_lowercase(),
        hostname: "staff.example".to_string(),
        actual_ip: None,
    });
}

/// A started bot on a mock server, for driving chat commands end to end.
pub(crate) struct Harness {
    pub bot: Bot,
    pub mock: Arc<MockTransport>,
    pub api: Arc<FakeApi>,
    pub config: Config,
    _logs: tempfile::TempDir,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let logs = tempfile::tempdir().expect("temp dir");
        let mut config = test_config();
        config.logs.dir = logs.path().display().to_string();
        let mock = Arc::new(MockTransport::new());
        let api = Arc::new(FakeApi::default());
        let bot = Bot::new(&config, mock.clone(), Arc::new(MemoryStore::new()), api.clone());
        bot.start().await.expect("bot starts");
        let harness = Self {
            bot,
            mock,
            api,
            config,
            _logs: logs,
        };
        harness.settle().await;
        harness
    }

    /// Run everything that is ready without firing pending timers.
    pub(crate) async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        settle().await;
    }

    /// A regular user joins the user channel and the join grace period passes.
    pub(crate) async fn user_joins(&self, nick: &str) {
        self.mock.emit(TransportEvent::Join {
            channel: self.config.channels.user.clone(),
            nick: nick.to_string(),
        });
        tokio::time::sleep(self.config.queue.join_grace() + Duration::from_secs(1)).await;
        self.settle().await;
    }

    pub(crate) async fn user_says(&self, nick: &str, text: &str) {
        let channel = self.config.channels.user.clone();
        self.user_says_in(&channel, nick, text).await;
    }

    pub(crate) async fn user_says_in(&self, channel: &str, nick: &str, text: &str) {
        self.say(channel, nick, "user.example", text).await;
    }

    pub(crate) async fn staff_says(&self, nick: &str, text: &str) {
        let channel = self.config.channels.staff.clone();
        self.staff_says_in(&channel, nick, text).await;
    }

    pub(crate) async fn staff_says_in(&self, channel: &str, nick: &str, text: &str) {
        make_staff(&self.mock, nick);
        self.say(channel, nick, "staff.example", text).await;
    }

    async fn say(&self, channel: &str, nick: &str, hostname: &str, text: &str) {
        self.mock.emit(TransportEvent::Message {
            nick: nick.to_string(),
            ident: nick.to_lowercase(),
            hostname: hostname.to_string(),
            target: channel.to_string(),
            text: text.to_string(),
        });
        self.settle().await;
    }

    /// Bodies of the PRIVMSGs sent to `channel`, oldest first.
    pub(crate) fn replies(&self, channel: &str) -> Vec<String> {
        let prefix = format!("PRIVMSG {channel} :");
        self.mock
            .sent_matching(&prefix)
            .into_iter()
            .map(|line| line[prefix.len()..].to_string())
            .collect()
    }
}

/// Scripted account API.
#[derive(Default)]
pub(crate) struct FakeApi {
    inner: parking_lot::Mutex<FakeApiInner>,
}

#[derive(Default)]
struct FakeApiInner {
    pastes: usize,
    fail_pastes: bool,
    fail_reenable: bool,
    anonymous: ReEnableResponse,
    staff: ReEnableResponse,
    calls: Vec<String>,
}

impl FakeApi {
    pub(crate) fn paste_count(&self) -> usize {
        self.inner.lock().pastes
    }

    pub(crate) fn fail_pastes(&self, fail: bool) {
        self.inner.lock().fail_pastes = fail;
    }

    /// Every re-enable call fails at the HTTP level.
    pub(crate) fn fail_reenable(&self, fail: bool) {
        self.inner.lock().fail_reenable = fail;
    }

    pub(crate) fn set_anonymous(&self, response: ReEnableResponse) {
        self.inner.lock().anonymous = response;
    }

    pub(crate) fn set_staff(&self, response: ReEnableResponse) {
        self.inner.lock().staff = response;
    }

    /// Re-enable calls as `user:<name>` or `staff:<name>:<enabler>:<reason>`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl AccountApi for FakeApi {
    async fn reenable_anonymous(&self, username: &str) -> Result<ReEnableResponse, ApiError> {
        let mut inner = self.inner.lock();
        inner.calls.push(format!("user:{username}"));
        if inner.fail_reenable {
            return Err(ApiError::Status {
                status: 500,
                path: format!("/api/reenable/{username}/user"),
            });
        }
        Ok(inner.anonymous.clone())
    }

    async fn reenable_as_staff(
        &self,
        username: &str,
        enabler: &str,
        reason: Option<&str>,
    ) -> Result<ReEnableResponse, ApiError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(format!("staff:{username}:{enabler}:{}", reason.unwrap_or("")));
        if inner.fail_reenable {
            return Err(ApiError::Status {
                status: 500,
                path: format!("/api/reenable/{username}/staff"),
            });
        }
        Ok(inner.staff.clone())
    }

    async fn create_paste(
        &self,
        _name: &str,
        _body: &str,
        passphrase: &str,
    ) -> Result<String, ApiError> {
        let mut inner = self.inner.lock();
        if inner.fail_pastes {
            return Err(ApiError::Paste("paste service down".into()));
        }
        inner.pastes += 1;
        Ok(format!(
            "https://example.test/pastes/{}?passphrase={passphrase}",
            inner.pastes
        ))
    }
}
