//! Channel membership tracking.
//!
//! Lower-cased channel name to the set of lower-cased nicks present. A
//! channel only has an entry once its roster snapshot arrived, which is the
//! one signal that the bot itself is in that channel.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ChannelState {
    channels: HashMap<String, HashSet<String>>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a join. Ignored for channels we have no roster for.
    pub fn on_join(&mut self, channel: &str, nick: &str) {
        if let Some(users) = self.channels.get_mut(&channel.to_lowercase()) {
            users.insert(nick.to_lowercase());
        }
    }

    /// Record a part or kick. Returns whether the nick was present.
    pub fn on_leave(&mut self, channel: &str, nick: &str) -> bool {
        self.channels
            .get_mut(&channel.to_lowercase())
            .is_some_and(|users| users.remove(&nick.to_lowercase()))
    }

    /// Remove a quitting nick everywhere; returns the channels it was in.
    pub fn on_quit(&mut self, nick: &str) -> Vec<String> {
        let nick = nick.to_lowercase();
        let mut left: Vec<String> = self
            .channels
            .iter_mut()
            .filter_map(|(channel, users)| users.remove(&nick).then(|| channel.clone()))
            .collect();
        left.sort();
        left
    }

    /// Replace the roster of a channel.
    pub fn on_user_list<I, S>(&mut self, channel: &str, nicks: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let users = nicks.into_iter().map(|n| n.as_ref().to_lowercase()).collect();
        self.channels.insert(channel.to_lowercase(), users);
    }

    pub fn on_nick_change(&mut self, old: &str, new: &str) {
        let old = old.to_lowercase();
        let new = new.to_lowercase();
        for users in self.channels.values_mut() {
            if users.remove(&old) {
                users.insert(new.clone());
            }
        }
    }

    pub fn on_disconnect(&mut self) {
        self.channels.clear();
    }

    /// Forget a channel the bot itself left.
    pub fn remove_channel(&mut self, channel: &str) {
        self.channels.remove(&channel.to_lowercase());
    }

    pub fn is_in_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(&channel.to_lowercase())
    }

    pub fn is_user_in_channel(&self, channel: &str, nick: &str) -> bool {
        self.channels
            .get(&channel.to_lowercase())
            .is_some_and(|users| users.contains(&nick.to_lowercase()))
    }

    /// Lower-cased nicks in a channel, sorted. Empty if unknown.
    pub fn users_in(&self, channel: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .channels
            .get(&channel.to_lowercase())
            .map(|u| u.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(channel: &str, nicks: &[&str]) -> ChannelState {
        let mut state = ChannelState::new();
        state.on_user_list(channel, nicks.iter().copied());
        state
    }

    #[test]
    fn user_list_replaces_roster() {
        let mut state = state_with("#Chan", &["Alice", "bob"]);
        assert!(state.is_in_channel("#chan"));
        state.on_user_list("#CHAN", ["carol"]);
        assert_eq!(state.users_in("#chan"), vec!["carol"]);
    }

    #[test]
    fn join_requires_known_channel() {
        let mut state = state_with("#a", &["renge"]);
        state.on_join("#b", "alice");
        assert!(!state.is_in_channel("#b"));
        state.on_join("#A", "Alice");
        assert!(state.is_user_in_channel("#a", "ALICE"));
    }

    #[test]
    fn quit_reports_every_channel() {
        let mut state = state_with("#a", &["alice", "renge"]);
        state.on_user_list("#b", ["ALICE"]);
        state.on_user_list("#c", ["bob"]);
        assert_eq!(state.on_quit("Alice"), vec!["#a", "#b"]);
        assert!(!state.is_user_in_channel("#a", "alice"));
        assert!(state.on_quit("alice").is_empty());
    }

    #[test]
    fn nick_change_moves_membership() {
        let mut state = state_with("#a", &["alice"]);
        state.on_nick_change("ALICE", "Alicia");
        assert!(state.is_user_in_channel("#a", "alicia"));
        assert!(!state.is_user_in_channel("#a", "alice"));
    }

    #[test]
    fn leave_and_disconnect() {
        let mut state = state_with("#a", &["alice"]);
        assert!(state.on_leave("#A", "alice"));
        assert!(!state.on_leave("#a", "alice"));
        assert!(state.is_in_channel("#a"));
        state.on_disconnect();
        assert!(!state.is_in_channel("#a"));
        assert!(state.users_in("#a").is_empty());
    }
}
