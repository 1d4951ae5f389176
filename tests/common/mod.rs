//! Integration test common infrastructure.
//!
//! Provides a bot wired to a scripted IRC server and a scripted account API,
//! and helpers for driving chat and asserting on what the bot sent.

pub mod api;
pub mod desk;

#[allow(unused_imports)]
pub use api::ScriptedApi;
#[allow(unused_imports)]
pub use desk::TestDesk;
