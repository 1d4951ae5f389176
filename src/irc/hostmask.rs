//! Staff hostmask matching.

/// Wildcard match supporting `*` (any run) and `?` (any single char).
///
/// Case-sensitive, anchored at both ends.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // Backtrack: let the last '*' swallow one more char.
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Match `nick!ident@host` style masks. The nick and ident parts are
/// optional: `*@host` and `host` only constrain what they name.
pub fn matches_hostmask(mask: &str, nick: &str, ident: &str, host: &str) -> bool {
    let mut rest = mask;
    if let Some((nick_pattern, r)) = rest.split_once('!') {
        if !wildcard_match(nick_pattern, nick) {
            return false;
        }
        rest = r;
    }
    if let Some((ident_pattern, r)) = rest.split_once('@') {
        if !wildcard_match(ident_pattern, ident) {
            return false;
        }
        rest = r;
    }
    wildcard_match(rest, host)
}
