//! Normalizing masks and keys set by local clients.

use meshirc_proto::collapse;

const NICKLEN: usize = 30;
const USERLEN: usize = 10;
const HOSTLEN: usize = 63;

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn or_star(s: &str) -> &str {
    if s.is_empty() { "*" } else { s }
}

/// Expand a ban argument into a full `nick!user@host` mask.
///
/// `nick` becomes `nick!*@*`, `user@host` becomes `*!user@host`,
/// `nick!user` becomes `nick!user@*`, and a bare token with `.`, `:` or
/// `/` is taken as a host. Extended bans keep their shape with the type
/// lowercased and a leading `!` turned into `~`.
pub fn pretty_mask(raw: &str) -> String {
    let cut = raw.split(char::is_whitespace).next().unwrap_or_default();
    let mask = collapse(cut);

    if let Some(rest) = mask.strip_prefix('$') {
        let mut chars = rest.chars();
        let mut out = String::from("$");
        match chars.next() {
            Some('!') | Some('~') => {
                out.push('~');
                if let Some(t) = chars.next() {
                    out.push(t.to_ascii_lowercase());
                }
            }
            Some(t) => out.push(t.to_ascii_lowercase()),
            None => {}
        }
        out.extend(chars);
        return out;
    }

    let (nick, user, host) = if let Some((before, host)) = mask.split_once('@') {
        match before.split_once('!') {
            Some((nick, user)) => (nick, user, host),
            None => ("", before, host),
        }
    } else if let Some((nick, user)) = mask.split_once('!') {
        (nick, user, "")
    } else if mask.contains(['.', ':', '/']) {
        ("", "", mask.as_str())
    } else {
        (mask.as_str(), "", "")
    };

    format!(
        "{}!{}@{}",
        truncate(or_star(nick), NICKLEN),
        truncate(or_star(user), USERLEN),
        truncate(or_star(host), HOSTLEN)
    )
}

/// Sanitize a key from a local client: 7-bit, no `:` or `,`, nothing at or
/// below space.
pub fn fix_key(raw: &str, max_len: usize) -> String {
    raw.bytes()
        .map(|b| b & 0x7f)
        .filter(|&c| c != b':' && c != b',' && c > b' ')
        .take(max_len)
        .map(char::from)
        .collect()
}

/// Sanitize a key from a peer: 7-bit, no CR, LF, `:`, `,` or space.
pub fn fix_key_remote(raw: &str, max_len: usize) -> String {
    raw.bytes()
        .map(|b| b & 0x7f)
        .filter(|&c| !matches!(c, b'\n' | b'\r' | b':' | b',' | b' '))
        .take(max_len)
        .map(char::from)
        .collect()
}
