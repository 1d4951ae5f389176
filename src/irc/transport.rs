//! The seam between the client facade and the wire.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event::{TransportEvent, WhoUser, WhoisUser};
use crate::config::IrcConfig;
use crate::error::TransportError;

/// Connection parameters handed to [`Transport::connect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub verify_tls: bool,
    pub nick: String,
    pub username: String,
    pub realname: String,
}

impl From<&IrcConfig> for ConnectParams {
    fn from(config: &IrcConfig) -> Self {
        Self {
            host: config.server.clone(),
            port: config.port,
            tls: config.use_tls,
            verify_tls: config.verify_tls,
            nick: config.nick.clone(),
            username: config.username.clone(),
            realname: config.realname.clone(),
        }
    }
}

/// A line-oriented IRC connection.
///
/// `connect` returns the event stream of the new connection; the stream ends
/// with [`TransportEvent::Closed`]. WHO and WHOIS replies are collected by the
/// transport and never appear on the event stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectParams,
    ) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError>;

    /// Queue a raw line for sending. Fire and forget.
    fn send_raw(&self, line: &str) -> Result<(), TransportError>;

    /// Ask the server for a WHO listing and wait for the end of it.
    async fn who(&self, target: &str) -> Result<Vec<WhoUser>, TransportError>;

    /// Ask the server for a WHOIS and wait for the end of it.
    async fn whois(&self, nick: &str) -> Result<WhoisUser, TransportError>;

    /// Send QUIT and close the connection.
    async fn quit(&self, message: &str);

    fn is_connected(&self) -> bool;
}
