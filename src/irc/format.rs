//! IRC text formatting helpers.
//!
//! Color codes follow the mIRC convention: `0x03` followed by a two-digit
//! foreground color, closed by another `0x03`.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

const COLOR: char = '\x03';

/// Named colors handed out to sessions, with their mIRC codes.
const PALETTE: &[(&str, u8)] = &[
    ("green", 3),
    ("navy", 2),
    ("red", 4),
    ("white", 0),
    ("brown", 5),
    ("purple", 6),
    ("yellow", 8),
    ("olive", 7),
    ("lime", 9),
    ("teal", 10),
    ("pink", 13),
    ("cyan", 11),
    ("gray", 14),
    ("blue", 12),
];

const BLACK: u8 = 1;

fn rotation() -> &'static AtomicUsize {
    static NEXT: OnceLock<AtomicUsize> = OnceLock::new();
    NEXT.get_or_init(|| AtomicUsize::new(rand::random::<usize>() % PALETTE.len()))
}

/// Next color name from the palette. Starts at a random index.
pub fn next_color() -> String {
    let i = rotation().fetch_add(1, Ordering::Relaxed) % PALETTE.len();
    PALETTE[i].0.to_string()
}

/// Wrap `text` in the named color. Unknown names render black.
pub fn colored(color: &str, text: &str) -> String {
    let code = PALETTE
        .iter()
        .find(|(name, _)| *name == color)
        .map(|(_, code)| *code)
        .unwrap_or(BLACK);
    format!("{COLOR}{code:02}{text}{COLOR}")
}

/// Interleave zero-width spaces so the text does not highlight its owner.
pub fn space(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for (i, c) in text.chars().enumerate() {
        if i > 0 {
            out.push('\u{200B}');
        }
        out.push(c);
    }
    out
}

/// Replace every case-insensitive occurrence of `nick` with its spaced form.
pub fn space_nick_in(text: &str, nick: &str) -> String {
    if nick.is_empty() {
        return text.to_string();
    }
    let pattern = format!("(?i){}", regex::escape(nick));
    match regex::Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures<'_>| space(&caps[0]))
            .into_owned(),
        Err(_) => text.to_string(),
    }
}

/// `2024-01-02 03:04:05 UTC`
pub fn friendly_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// "a minute", "12 minutes", "one hour", "3 hours".
pub fn minutes_to_string(minutes: i64) -> String {
    let hours = minutes / 60;
    match (hours, minutes) {
        (1, _) => "one hour".to_string(),
        (h, _) if h > 1 => format!("{h} hours"),
        (_, 1) => "a minute".to_string(),
        (_, m) => format!("{m} minutes"),
    }
}
