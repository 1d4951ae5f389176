//! Support sessions: one-on-one conversations between a staff member and a
//! user in a channel from the session pool.

mod history;
mod manager;
mod state;
mod support;

pub use history::{LogHistory, MAX_PREVIOUS_LOGS};
pub use manager::{ChannelHook, SessionManager};
pub use state::{PreviousLog, SessionSnapshot};
pub use support::{Cleanup, CleanupFuture, Session, SessionContext};
