//! Clients, local and remote.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use bitflags::bitflags;
use meshirc_proto::irc_to_lower;

use super::arena::Handle;
use super::channel::ChannelId;
use super::conn::ConnId;
use crate::propagate::LinkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

bitflags! {
    /// User modes that matter to channel logic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UserModes: u16 {
        const OPER = 1 << 0;
        const INVISIBLE = 1 << 1;
        const SERVICE = 1 << 2;
        const WALLOPS = 1 << 3;
    }
}

const UMODE_LETTERS: [(char, UserModes); 4] = [
    ('o', UserModes::OPER),
    ('i', UserModes::INVISIBLE),
    ('S', UserModes::SERVICE),
    ('w', UserModes::WALLOPS),
];

impl UserModes {
    /// Parse a `+oi`-style string; unknown letters are ignored.
    pub fn from_letters(s: &str) -> Self {
        s.chars()
            .filter_map(|c| UMODE_LETTERS.iter().find(|(l, _)| *l == c))
            .fold(Self::empty(), |acc, (_, m)| acc | *m)
    }

    pub fn to_letters(self) -> String {
        let mut out = String::from("+");
        for (letter, mode) in UMODE_LETTERS {
            if self.contains(mode) {
                out.push(letter);
            }
        }
        out
    }
}

bitflags! {
    /// Network operator privileges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OperPrivs: u8 {
        const ADMIN = 1 << 0;
        const RESV = 1 << 1;
    }
}

impl OperPrivs {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names.iter().fold(Self::empty(), |acc, n| {
            acc | match n.as_ref() {
                "admin" => Self::ADMIN,
                "resv" => Self::RESV,
                _ => Self::empty(),
            }
        })
    }
}

/// Where a client is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local(ConnId),
    /// Behind this directly connected link.
    Remote(LinkId),
}

#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub uid: String,
    pub nick: String,
    pub user: String,
    /// Visible host.
    pub host: String,
    /// Numeric address, `0` when unknown.
    pub ip: String,
    /// Real host when `host` is obfuscated.
    pub alt_host: Option<String>,
    pub realname: String,
    pub account: Option<String>,
    /// Name of the server the client is on.
    pub server: String,
    pub ts: i64,
    pub umodes: UserModes,
    pub privs: OperPrivs,
    pub origin: Origin,
    pub channels: HashMap<ChannelId, Handle>,
    pub invites: HashSet<ChannelId>,
}

impl Client {
    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local(_))
    }

    pub fn conn(&self) -> Option<ConnId> {
        match self.origin {
            Origin::Local(conn) => Some(conn),
            Origin::Remote(_) => None,
        }
    }

    pub fn link(&self) -> Option<LinkId> {
        match self.origin {
            Origin::Remote(link) => Some(link),
            Origin::Local(_) => None,
        }
    }

    /// `nick!user@host`
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    pub fn is_oper(&self) -> bool {
        self.umodes.contains(UserModes::OPER)
    }

    pub fn is_service(&self) -> bool {
        self.umodes.contains(UserModes::SERVICE)
    }
}

/// Seconds during which an old nick still resolves to its new owner.
pub const NICK_CHASE_WINDOW: i64 = 90;

#[derive(Debug, Clone)]
struct NickChange {
    old: String,
    client: ClientId,
    at: i64,
}

/// Recent nick changes, newest last.
#[derive(Debug)]
pub struct NickHistory {
    entries: VecDeque<NickChange>,
    capacity: usize,
}

impl NickHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, old_nick: &str, client: ClientId, at: i64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(NickChange {
            old: irc_to_lower(old_nick),
            client,
            at,
        });
    }

    /// Most recent owner of `nick` within the chase window.
    pub fn resolve(&self, nick: &str, now: i64) -> Option<ClientId> {
        let folded = irc_to_lower(nick);
        self.entries
            .iter()
            .rev()
            .take_while(|e| now - e.at <= NICK_CHASE_WINDOW)
            .find(|e| e.old == folded)
            .map(|e| e.client)
    }
}
