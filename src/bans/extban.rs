//! Extended bans
//!
//! Masks of the form `$[~]type[:arg]` match on client attributes instead of
//! `nick!user@host`. A leading `~` inverts the result.
//!
//! Supported types:
//! - `$a[:mask]` - logged into an account matching `mask`, or any account
//! - `$o` - IRC operator
//! - `$r:mask` - realname matches
//! - `$s:mask` - connected to a server whose name matches
//! - `$m:letters` - has every listed user mode
//! - `$c:#chan` - member of another channel
//!
//! An extban that cannot be evaluated is [`ExtbanMatch::Invalid`]. Invalid
//! extbans never match, and a local client may not set one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use meshirc_proto::{irc_eq, wildcard_match};

use crate::state::{Channel, Client, Network, UserModes, is_channel_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtbanMatch {
    NoMatch,
    Match,
    Invalid,
}

impl From<bool> for ExtbanMatch {
    fn from(hit: bool) -> Self {
        if hit { Self::Match } else { Self::NoMatch }
    }
}

/// Evaluates one extban type.
pub trait ExtbanMatcher: Send + Sync {
    fn check(&self, arg: Option<&str>, client: &Client, chan: &Channel, net: &Network) -> ExtbanMatch;
}

/// A parsed `$[~]type[:arg]` mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extban<'a> {
    pub kind: char,
    pub invert: bool,
    pub arg: Option<&'a str>,
}

impl<'a> Extban<'a> {
    /// Parse an extban mask. Returns `None` unless it starts with `$` and
    /// names a type.
    ///
    /// ```
    /// use meshircd::bans::Extban;
    ///
    /// let ban = Extban::parse("$~a:spammer").unwrap();
    /// assert_eq!((ban.kind, ban.invert, ban.arg), ('a', true, Some("spammer")));
    /// assert_eq!(Extban::parse("$o").unwrap().arg, None);
    /// assert!(Extban::parse("nick!*@*").is_none());
    /// ```
    pub fn parse(mask: &'a str) -> Option<Self> {
        let rest = mask.strip_prefix('$')?;
        let (invert, rest) = match rest.strip_prefix('~') {
            Some(r) => (true, r),
            None => (false, rest),
        };
        let mut chars = rest.chars();
        let kind = chars.next()?.to_ascii_lowercase();
        let tail = chars.as_str();
        let arg = match tail.strip_prefix(':') {
            Some(a) => Some(a),
            None if tail.is_empty() => None,
            None => return None,
        };
        Some(Self { kind, invert, arg })
    }
}

/// Extban types by letter.
#[derive(Clone, Default)]
pub struct ExtbanRegistry {
    matchers: HashMap<char, Arc<dyn ExtbanMatcher>>,
}

impl fmt::Debug for ExtbanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.matchers.keys().collect();
        kinds.sort();
        f.debug_struct("ExtbanRegistry").field("kinds", &kinds).finish()
    }
}

impl ExtbanRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register('a', Account);
        registry.register('o', Oper);
        registry.register('r', Realname);
        registry.register('s', Server);
        registry.register('m', Umodes);
        registry.register('c', ChannelMember);
        registry
    }

    pub fn register<M: ExtbanMatcher + 'static>(&mut self, kind: char, matcher: M) {
        self.matchers.insert(kind, Arc::new(matcher));
    }

    /// Letters of registered types, sorted, for `EXTBAN=$,<letters>`.
    pub fn kinds(&self) -> String {
        let mut kinds: Vec<char> = self.matchers.keys().copied().collect();
        kinds.sort_unstable();
        kinds.into_iter().collect()
    }

    /// Evaluate `mask` for `client` on `chan`, applying inversion.
    pub fn evaluate(&self, mask: &str, client: &Client, chan: &Channel, net: &Network) -> ExtbanMatch {
        let Some(ban) = Extban::parse(mask) else {
            return ExtbanMatch::Invalid;
        };
        let Some(matcher) = self.matchers.get(&ban.kind) else {
            return ExtbanMatch::Invalid;
        };
        match matcher.check(ban.arg, client, chan, net) {
            ExtbanMatch::Invalid => ExtbanMatch::Invalid,
            result if ban.invert => (result == ExtbanMatch::NoMatch).into(),
            result => result,
        }
    }

    pub fn matches(&self, mask: &str, client: &Client, chan: &Channel, net: &Network) -> bool {
        self.evaluate(mask, client, chan, net) == ExtbanMatch::Match
    }

    /// Whether `client` may set `mask` on `chan`.
    pub fn is_valid(&self, mask: &str, client: &Client, chan: &Channel, net: &Network) -> bool {
        self.evaluate(mask, client, chan, net) != ExtbanMatch::Invalid
    }
}

struct Account;

impl ExtbanMatcher for Account {
    fn check(&self, arg: Option<&str>, client: &Client, _: &Channel, _: &Network) -> ExtbanMatch {
        match (&client.account, arg) {
            (None, _) => ExtbanMatch::NoMatch,
            (Some(_), None) => ExtbanMatch::Match,
            (Some(account), Some(mask)) => wildcard_match(mask, account).into(),
        }
    }
}

struct Oper;

impl ExtbanMatcher for Oper {
    fn check(&self, _: Option<&str>, client: &Client, _: &Channel, _: &Network) -> ExtbanMatch {
        client.is_oper().into()
    }
}

struct Realname;

impl ExtbanMatcher for Realname {
    fn check(&self, arg: Option<&str>, client: &Client, _: &Channel, _: &Network) -> ExtbanMatch {
        match arg {
            Some(mask) => wildcard_match(mask, &client.realname).into(),
            None => ExtbanMatch::Invalid,
        }
    }
}

struct Server;

impl ExtbanMatcher for Server {
    fn check(&self, arg: Option<&str>, client: &Client, _: &Channel, _: &Network) -> ExtbanMatch {
        match arg {
            Some(mask) => wildcard_match(mask, &client.server).into(),
            None => ExtbanMatch::Invalid,
        }
    }
}

struct Umodes;

impl ExtbanMatcher for Umodes {
    fn check(&self, arg: Option<&str>, client: &Client, _: &Channel, _: &Network) -> ExtbanMatch {
        let wanted = arg.map(UserModes::from_letters).unwrap_or_default();
        if wanted.is_empty() {
            return ExtbanMatch::Invalid;
        }
        client.umodes.contains(wanted).into()
    }
}

struct ChannelMember;

impl ExtbanMatcher for ChannelMember {
    fn check(&self, arg: Option<&str>, client: &Client, chan: &Channel, net: &Network) -> ExtbanMatch {
        let Some(name) = arg.filter(|n| is_channel_name(n)) else {
            return ExtbanMatch::Invalid;
        };
        if irc_eq(name, &chan.name) {
            return ExtbanMatch::Invalid;
        }
        match net.find_channel(name) {
            Some(other) => client.channels.contains_key(&other).into(),
            None => ExtbanMatch::Invalid,
        }
    }
}
