//! Channel entity and its mode state.

use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;

use super::arena::Handle;
use super::client::ClientId;
use super::lists::{BanList, ListKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

bitflags! {
    /// Argument-less channel modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelModes: u32 {
        const NOCTCP = 1 << 0;
        const FREETARGET = 1 << 1;
        const DISFORWARD = 1 << 2;
        const NOCOLOR = 1 << 3;
        const FREEINVITE = 1 << 4;
        const INVITEONLY = 1 << 5;
        const MODERATED = 1 << 6;
        const NOPRIVMSGS = 1 << 7;
        const PRIVATE = 1 << 8;
        const SECRET = 1 << 9;
        const TOPICLIMIT = 1 << 10;
        const OPMODERATE = 1 << 11;
        const EXLIMIT = 1 << 12;
        const PERMANENT = 1 << 13;
        const REGONLY = 1 << 14;
    }
}

/// Letter for each flag, in display order.
pub const MODE_LETTERS: [(char, ChannelModes); 15] = [
    ('C', ChannelModes::NOCTCP),
    ('F', ChannelModes::FREETARGET),
    ('L', ChannelModes::EXLIMIT),
    ('P', ChannelModes::PERMANENT),
    ('Q', ChannelModes::DISFORWARD),
    ('c', ChannelModes::NOCOLOR),
    ('g', ChannelModes::FREEINVITE),
    ('i', ChannelModes::INVITEONLY),
    ('m', ChannelModes::MODERATED),
    ('n', ChannelModes::NOPRIVMSGS),
    ('p', ChannelModes::PRIVATE),
    ('r', ChannelModes::REGONLY),
    ('s', ChannelModes::SECRET),
    ('t', ChannelModes::TOPICLIMIT),
    ('z', ChannelModes::OPMODERATE),
];

impl ChannelModes {
    pub fn from_letter(c: char) -> Option<Self> {
        MODE_LETTERS
            .iter()
            .find(|(l, _)| *l == c)
            .map(|(_, m)| *m)
    }

    /// Letters of every set flag, without a sign.
    pub fn letters(self) -> String {
        MODE_LETTERS
            .iter()
            .filter(|(_, m)| self.contains(*m))
            .map(|(l, _)| *l)
            .collect()
    }
}

/// Join throttle: at most `joins` joins per `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pub joins: u32,
    pub seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeParams {
    pub key: Option<String>,
    pub limit: Option<u32>,
    pub throttle: Option<Throttle>,
    pub forward: Option<String>,
}

/// Server-enforced mode lock: letters local clients may not change, in
/// either direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeLock {
    /// Lock string as it was set, e.g. `+ntr-i`.
    pub raw: String,
}

impl ModeLock {
    pub fn new(raw: &str) -> Self {
        Self { raw: raw.to_string() }
    }

    pub fn is_empty(&self) -> bool {
        !self.raw.chars().any(|c| c != '+' && c != '-')
    }

    /// Whether local clients are barred from changing `letter`.
    pub fn locks(&self, letter: char) -> bool {
        letter != '+' && letter != '-' && self.raw.contains(letter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    /// Name as first created; lookups go through the folded index.
    pub name: String,
    /// Creation timestamp.
    pub ts: i64,
    pub modes: ChannelModes,
    pub params: ModeParams,
    pub lock: ModeLock,
    /// Bumped on every list mutation; cached verdicts carry the value they saw.
    pub bans_generation: u64,
    lists: [BanList; 4],
    pub topic: Option<Topic>,
    pub members: HashMap<ClientId, Handle>,
    pub join_count: u32,
    pub join_delta: i64,
}

impl Channel {
    pub fn new(id: ChannelId, name: &str, ts: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            ts,
            modes: ChannelModes::empty(),
            params: ModeParams::default(),
            lock: ModeLock::default(),
            bans_generation: 0,
            lists: Default::default(),
            topic: None,
            members: HashMap::new(),
            join_count: 0,
            join_delta: 0,
        }
    }

    /// `&` channels stay on this server.
    pub fn is_local(&self) -> bool {
        self.name.starts_with('&')
    }

    pub fn list(&self, kind: ListKind) -> &BanList {
        &self.lists[kind.index()]
    }

    /// Mutable list access. Callers that change the list must bump the
    /// generation; [`Channel::list_changed`] does both in one call.
    pub fn list_mut(&mut self, kind: ListKind) -> &mut BanList {
        &mut self.lists[kind.index()]
    }

    pub fn list_changed(&mut self) {
        self.bans_generation += 1;
    }

    /// Entries across all four lists.
    pub fn list_total(&self) -> usize {
        self.lists.iter().map(BanList::len).sum()
    }

    pub fn has_lists(&self) -> bool {
        self.lists.iter().any(|l| !l.is_empty())
    }

    /// Drop every list entry, e.g. when losing a timestamp fight.
    pub fn clear_lists(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        self.bans_generation += 1;
    }

    /// `+modes params` as shown by RPL_CHANNELMODEIS and sent in SJOIN.
    pub fn mode_string(&self, with_params: bool) -> String {
        let mut letters = String::from("+");
        letters.push_str(&self.modes.letters());
        let mut params = Vec::new();

        if let Some(limit) = self.params.limit {
            letters.push('l');
            params.push(limit.to_string());
        }
        if let Some(key) = &self.params.key {
            letters.push('k');
            params.push(key.clone());
        }
        if let Some(t) = self.params.throttle {
            letters.push('j');
            params.push(format!("{}:{}", t.joins, t.seconds));
        }
        if let Some(forward) = &self.params.forward {
            letters.push('f');
            params.push(forward.clone());
        }

        if with_params && !params.is_empty() {
            format!("{} {}", letters, params.join(" "))
        } else {
            letters
        }
    }

    /// True when a `+j` throttle currently refuses joins.
    pub fn throttled(&self, now: i64) -> bool {
        match self.params.throttle {
            Some(t) if t.joins > 0 && t.seconds > 0 => {
                now - self.join_delta <= i64::from(t.seconds) && self.join_count >= t.joins
            }
            _ => false,
        }
    }

    /// Count a join against the throttle window.
    pub fn record_join(&mut self, now: i64) {
        let Some(t) = self.params.throttle else {
            return;
        };
        if now - self.join_delta > i64::from(t.seconds) {
            self.join_count = 0;
            self.join_delta = now;
        }
        self.join_count += 1;
    }

    pub fn reset_throttle(&mut self) {
        self.join_count = 0;
        self.join_delta = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_follow_display_order() {
        let modes = ChannelModes::SECRET | ChannelModes::NOPRIVMSGS | ChannelModes::TOPICLIMIT;
        assert_eq!(modes.letters(), "nst");
        assert_eq!(ChannelModes::from_letter('P'), Some(ChannelModes::PERMANENT));
        assert_eq!(ChannelModes::from_letter('b'), None);
    }

    #[test]
    fn mode_string_hides_params_on_request() {
        let mut chan = Channel::new(ChannelId(1), "#a", 100);
        chan.modes = ChannelModes::NOPRIVMSGS | ChannelModes::TOPICLIMIT;
        chan.params.limit = Some(10);
        chan.params.key = Some("secret".into());
        assert_eq!(chan.mode_string(true), "+ntlk 10 secret");
        assert_eq!(chan.mode_string(false), "+ntlk");
    }

    #[test]
    fn lock_covers_every_listed_letter() {
        let lock = ModeLock::new("+ntrk-il");
        for c in ['n', 't', 'r', 'k', 'i', 'l'] {
            assert!(lock.locks(c), "{c}");
        }
        assert!(!lock.locks('m'));
        assert!(!lock.locks('+'));
        assert!(!lock.locks('-'));
        assert!(!lock.is_empty());
        assert!(ModeLock::new("+-").is_empty());
        assert!(ModeLock::default().is_empty());
    }

    #[test]
    fn throttle_window() {
        let mut chan = Channel::new(ChannelId(1), "#a", 100);
        chan.params.throttle = Some(Throttle {
            joins: 2,
            seconds: 10,
        });
        chan.record_join(1000);
        assert!(!chan.throttled(1001));
        chan.record_join(1001);
        assert!(chan.throttled(1002));
        assert!(!chan.throttled(1011));
        chan.record_join(1011);
        assert_eq!(chan.join_count, 1);
    }

    #[test]
    fn list_changes_bump_generation() {
        let mut chan = Channel::new(ChannelId(1), "&local", 1);
        assert!(chan.is_local());
        let before = chan.bans_generation;
        chan.list_mut(ListKind::Ban).push("*!*@x".into(), "me".into(), 1);
        chan.list_changed();
        assert_eq!(chan.bans_generation, before + 1);
        assert_eq!(chan.list_total(), 1);
        chan.clear_lists();
        assert!(!chan.has_lists());
    }
}
