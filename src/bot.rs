//! Wiring of the IRC client, queue, session registry and commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::api::AccountApi;
use crate::commands::Commands;
use crate::config::Config;
use crate::error::StoreError;
use crate::irc::{IrcClient, Transport};
use crate::queue::SupportQueue;
use crate::session::{LogHistory, SessionContext, SessionManager};
use crate::store::Store;

pub struct Bot {
    irc: Arc<IrcClient>,
    queue: Arc<SupportQueue>,
    sessions: Arc<SessionManager>,
    commands: Arc<Commands>,
}

impl Bot {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        api: Arc<dyn AccountApi>,
    ) -> Self {
        let irc = IrcClient::new(transport, config);
        let queue = SupportQueue::new(irc.clone(), store.clone(), config.queue.clone());
        let ctx = Arc::new(SessionContext {
            irc: irc.clone(),
            queue: queue.clone(),
            history: Arc::new(LogHistory::new(store.clone())),
            store,
            api,
            logs_dir: PathBuf::from(&config.logs.dir),
        });
        let sessions = SessionManager::new(ctx);
        let commands = Commands::new(sessions.clone(), config.queue.max_reason_len);
        Self {
            irc,
            queue,
            sessions,
            commands,
        }
    }

    pub fn irc(&self) -> &Arc<IrcClient> {
        &self.irc
    }

    pub fn queue(&self) -> &Arc<SupportQueue> {
        &self.queue
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Load persisted state, connect, and resume sessions once every channel
    /// is joined.
    pub async fn start(&self) -> Result<(), StoreError> {
        self.queue.init().await?;
        self.commands.register();
        tokio::spawn(self.irc.clone().run_connect_loop());
        self.irc.wait_until_joined().await;
        self.sessions.start().await?;
        info!(
            queued = self.queue.len(),
            sessions = self.sessions.active_sessions().len(),
            "Support desk is open"
        );
        Ok(())
    }

    /// Quit IRC and wait up to `grace` for in-flight handlers.
    pub async fn shutdown(&self, grace: Duration) {
        info!("Shutting down");
        self.irc.shut_down().await;
        let tracker = self.irc.tracker();
        tracker.close();
        if timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                pending = tracker.len(),
                "Handlers still running at shutdown, abandoning them"
            );
        }
    }
}
