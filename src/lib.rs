//! deskbot - IRC support desk bot
//!
//! Users wait in a support queue; staff pick them up into private session
//! channels whose transcripts are archived and uploaded when the session
//! ends. Pruned accounts can be re-enabled through the site's account API.

pub mod api;
pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod irc;
pub mod queue;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use bot::Bot;
