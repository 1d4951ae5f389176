//! IRC connectivity: transport seam, membership tracking and the client facade.

mod client;
mod event;
pub mod format;
mod handlers;
pub mod hostmask;
mod membership;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
mod tcp;
mod tls;
mod transport;
pub mod wire;

pub use client::{IrcClient, Phase};
pub use event::{
    ChannelMessage, LeaveKind, NickChanged, TransportEvent, UserJoined, UserLeft, WhoUser,
    WhoisUser,
};
pub use handlers::{HandlerFuture, HandlerList, Subscription};
pub use membership::ChannelState;
#[cfg(any(test, feature = "testing"))]
pub use mock::MockTransport;
pub use tcp::TcpTransport;
pub use transport::{ConnectParams, Transport};
