//! rfc1459 case mapping.
//!
//! Nicks and channel names compare case-insensitively, and `[]\~` are the
//! uppercase forms of `{}|^`. Every index keyed by a name stores the folded
//! form produced by [`irc_to_lower`].

/// Fold a single character.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a whole string, suitable as a map key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive equality under rfc1459.
pub fn irc_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.chars()
        .zip(b.chars())
        .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_char_maps_brackets() {
        assert_eq!(irc_lower_char('A'), 'a');
        assert_eq!(irc_lower_char('['), '{');
        assert_eq!(irc_lower_char(']'), '}');
        assert_eq!(irc_lower_char('\\'), '|');
        assert_eq!(irc_lower_char('~'), '^');
        assert_eq!(irc_lower_char('#'), '#');
    }

    #[test]
    fn to_lower_folds_channel_names() {
        assert_eq!(irc_to_lower("#Mesh[1]"), "#mesh{1}");
        assert_eq!(irc_to_lower("Nick\\Away"), "nick|away");
    }

    #[test]
    fn eq_is_case_insensitive() {
        assert!(irc_eq("#channel[1]", "#CHANNEL{1}"));
        assert!(irc_eq("secret", "SeCrEt"));
        assert!(!irc_eq("short", "longer"));
        assert!(!irc_eq("alice", "alicf"));
    }
}
