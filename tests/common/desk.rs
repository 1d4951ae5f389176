//! A started bot on a mock IRC server.

use super::ScriptedApi;
use deskbot::Bot;
use deskbot::config::{Config, StorageBackend};
use deskbot::irc::{MockTransport, TransportEvent, WhoisUser};
use deskbot::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

pub struct TestDesk {
    pub bot: Bot,
    pub mock: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub api: Arc<ScriptedApi>,
    pub logs: tempfile::TempDir,
}

fn config(logs: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.channels.sessions = vec!["#s1".into(), "#s2".into()];
    config.channels.staff_hostmasks = vec!["*!*@staff.example".into()];
    config.storage.backend = StorageBackend::Memory;
    config.logs.dir = logs.path().display().to_string();
    config
}

#[allow(dead_code)]
impl TestDesk {
    pub async fn start() -> Self {
        Self::start_with(Arc::new(MemoryStore::new()), |_| {}).await
    }

    /// Start on `store`, letting `prepare` script the server first.
    pub async fn start_with(store: Arc<MemoryStore>, prepare: impl FnOnce(&MockTransport)) -> Self {
        let logs = tempfile::tempdir().expect("Failed to create logs dir");
        let mock = Arc::new(MockTransport::new());
        prepare(&mock);
        let api = Arc::new(ScriptedApi::default());
        let bot = Bot::new(&config(&logs), mock.clone(), store.clone(), api.clone());
        bot.start().await.expect("Bot failed to start");
        let desk = Self {
            bot,
            mock,
            store,
            api,
            logs,
        };
        desk.settle().await;
        desk
    }

    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    pub fn make_staff(&self, nick: &str) {
        self.mock.set_whois(WhoisUser {
            nick: nick.to_string(),
            ident: nick.to_lowercase(),
            hostname: "staff.example".to_string(),
            actual_ip: None,
        });
    }

    /// Emit a message without waiting for handlers.
    pub fn emit_message(&self, channel: &str, nick: &str, text: &str) {
        self.mock.emit(TransportEvent::Message {
            nick: nick.to_string(),
            ident: nick.to_lowercase(),
            hostname: "host.example".to_string(),
            target: channel.to_string(),
            text: text.to_string(),
        });
    }

    pub async fn say(&self, channel: &str, nick: &str, text: &str) {
        self.emit_message(channel, nick, text);
        self.settle().await;
    }

    pub async fn join(&self, channel: &str, nick: &str) {
        self.mock.emit(TransportEvent::Join {
            channel: channel.to_string(),
            nick: nick.to_string(),
        });
        self.settle().await;
    }

    pub fn replies(&self, channel: &str) -> Vec<String> {
        let prefix = format!("PRIVMSG {channel} :");
        self.mock
            .sent_matching(&prefix)
            .into_iter()
            .map(|line| line[prefix.len()..].to_string())
            .collect()
    }
}
