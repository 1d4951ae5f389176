//! Minimal IRC line parsing.
//!
//! Only what the bot reads off the wire: an optional prefix, the command and
//! its parameters. Message tags are skipped.

/// Origin of a line: a server name or a `nick!user@host` mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    ServerName(String),
    Nickname(String, String, String),
}

impl Prefix {
    /// Lenient prefix parse; a dot before any `!`/`@` marks a server name.
    pub fn parse(s: &str) -> Self {
        let (name, rest) = match s.find(['!', '@']) {
            Some(i) => (&s[..i], &s[i..]),
            None => (s, ""),
        };
        if rest.is_empty() && name.contains('.') {
            return Prefix::ServerName(name.to_string());
        }
        let (user, host) = match rest.strip_prefix('!') {
            Some(r) => match r.split_once('@') {
                Some((u, h)) => (u, h),
                None => (r, ""),
            },
            None => ("", rest.strip_prefix('@').unwrap_or("")),
        };
        Prefix::Nickname(name.to_string(), user.to_string(), host.to_string())
    }

    /// The nick, or an empty string for server prefixes.
    pub fn nick(&self) -> &str {
        match self {
            Prefix::Nickname(nick, _, _) => nick,
            Prefix::ServerName(_) => "",
        }
    }
}

/// One parsed IRC line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    /// Parse a raw line (without the trailing CRLF). Returns `None` for
    /// lines with no command.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map(|(_, r)| r)?;
        }
        rest = rest.trim_start_matches(' ');

        let prefix = match rest.strip_prefix(':') {
            Some(p) => {
                let (prefix, r) = p.split_once(' ')?;
                rest = r;
                Some(Prefix::parse(prefix))
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };
        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(t) = trailing {
            params.push(t.to_string());
        }

        Some(Line {
            prefix,
            command,
            params,
        })
    }

    /// Three-digit numeric reply code, if this is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    pub fn param(&self, i: usize) -> &str {
        self.params.get(i).map(String::as_str).unwrap_or("")
    }

    pub fn source_nick(&self) -> &str {
        self.prefix.as_ref().map(Prefix::nick).unwrap_or("")
    }
}

/// Build an outbound line, prefixing the last argument with `:` when needed.
pub fn format_line(command: &str, args: &[&str]) -> String {
    let mut line = command.to_string();
    let last = args.len().saturating_sub(1);
    for (i, arg) in args.iter().enumerate() {
        line.push(' ');
        if i == last && (arg.is_empty() || arg.contains(' ') || arg.starts_with(':')) {
            line.push(':');
        }
        line.push_str(arg);
    }
    line
}
