//! Hostmask matching.
//!
//! Traditional IRC wildcards only: `*` matches any run of characters, `?`
//! matches exactly one. Comparison folds case with the rfc1459 mapping.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::casemap::irc_lower_char;

/// Match `text` against the wildcard `pattern`.
///
/// ```
/// use meshirc_proto::mask::wildcard_match;
///
/// assert!(wildcard_match("*!*@*.example.com", "nick!user@host.EXAMPLE.com"));
/// assert!(wildcard_match("te?t", "test"));
/// assert!(!wildcard_match("*!admin@*", "nick!user@host"));
/// ```
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();
    glob(&pattern, &text, false)
}

/// Check whether the mask `name` is equal to or more specific than `mask`.
///
/// Differs from [`wildcard_match`] in that a `?` in `mask` never matches a
/// literal `*` in `name`, so `a?c` does not cover `a*c`.
pub fn mask_match(mask: &str, name: &str) -> bool {
    let mask: Vec<char> = mask.chars().map(irc_lower_char).collect();
    let name: Vec<char> = name.chars().map(irc_lower_char).collect();
    glob(&mask, &name, true)
}

fn glob(pattern: &[char], text: &[char], strict: bool) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if p < pattern.len()
            && (pattern[p] == text[t] || (pattern[p] == '?' && !(strict && text[t] == '*')))
        {
            p += 1;
            t += 1;
        } else if let Some(sp) = star_p {
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

/// Squash runs of `*` into a single `*`.
///
/// ```
/// use meshirc_proto::mask::collapse;
///
/// assert_eq!(collapse("**!***@*.net"), "*!*@*.net");
/// ```
pub fn collapse(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut in_star = false;
    for c in pattern.chars() {
        if c == '*' {
            if !in_star {
                out.push('*');
            }
            in_star = true;
        } else {
            out.push(c);
            in_star = false;
        }
    }
    out
}

/// Match `nick!user@ip` against a mask whose host part is a CIDR block.
///
/// The `nick!user` parts are compared with [`wildcard_match`]; the host part
/// of the mask must be `address/len` with a nonzero length in the same
/// address family as `address`.
///
/// ```
/// use meshirc_proto::mask::match_cidr;
///
/// assert!(match_cidr("*!*@10.0.0.0/8", "nick!user@10.1.2.3"));
/// assert!(!match_cidr("*!*@10.0.0.0/8", "nick!user@192.168.0.1"));
/// ```
pub fn match_cidr(mask: &str, address: &str) -> bool {
    let Some((mask_prefix, net)) = mask.rsplit_once('@') else {
        return false;
    };
    let Some((addr_prefix, ip)) = address.rsplit_once('@') else {
        return false;
    };
    let Some((_, len)) = net.rsplit_once('/') else {
        return false;
    };
    if len.parse::<u8>().map_or(true, |l| l == 0) {
        return false;
    }

    let (Ok(net), Ok(ip)) = (IpNet::from_str(net), IpAddr::from_str(ip)) else {
        return false;
    };
    let same_family = matches!(
        (&net, &ip),
        (IpNet::V4(_), IpAddr::V4(_)) | (IpNet::V6(_), IpAddr::V6(_))
    );

    same_family && net.contains(&ip) && wildcard_match(mask_prefix, addr_prefix)
}
