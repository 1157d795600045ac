//! The per-command record of mode changes.

use bitflags::bitflags;

use crate::propagate::Caps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Add,
    Del,
    Query,
}

impl Direction {
    pub fn sign(self) -> char {
        match self {
            Direction::Add => '+',
            Direction::Del => '-',
            Direction::Query => '=',
        }
    }
}

/// Who sees a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    AllMembers,
    ChanOps,
    /// Propagated to peers, never shown locally.
    ServersOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub letter: char,
    pub dir: Direction,
    /// Display form of the argument.
    pub arg: Option<String>,
    /// UID form for nick-targeted letters; peers get this instead of `arg`.
    pub id: Option<String>,
    /// Peers must have all of these to see the change.
    pub caps: Caps,
    /// Peers must have none of these to see the change.
    pub nocaps: Caps,
    pub scope: Scope,
}

impl ModeChange {
    pub fn new(letter: char, dir: Direction, arg: Option<String>) -> Self {
        Self {
            letter,
            dir,
            arg,
            id: None,
            caps: Caps::empty(),
            nocaps: Caps::empty(),
            scope: Scope::AllMembers,
        }
    }

    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }
}

bitflags! {
    /// Conditions already reported to the invoker during this command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeErrors: u32 {
        const NOOPS = 1 << 0;
        const NOTONCHANNEL = 1 << 1;
        const USERNOTINCHANNEL = 1 << 2;
        const UNKNOWN = 1 << 3;
        const NOPRIVS = 1 << 4;
        const MLOCK = 1 << 5;
        const BANLIST_FULL = 1 << 6;
        const BAD_FORWARD = 1 << 7;
        const RPL_BANLIST = 1 << 8;
        const RPL_EXCEPTLIST = 1 << 9;
        const RPL_INVITELIST = 1 << 10;
        const RPL_QUIETLIST = 1 << 11;
        const RPL_FORWARD = 1 << 12;
    }
}

/// Everything one mode command produced: records, the replies owed to the
/// invoker, and the per-command counters.
#[derive(Debug, Default)]
pub struct ModeBatch {
    pub changes: Vec<ModeChange>,
    /// Numerics and notices for the local invoker.
    pub replies: Vec<String>,
    errors: ModeErrors,
    simple_used: usize,
    params_used: usize,
}

impl ModeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn push(&mut self, change: ModeChange) {
        self.changes.push(change);
    }

    /// Mark `err` reported. True only the first time in this command.
    pub fn first_report(&mut self, err: ModeErrors) -> bool {
        let first = !self.errors.contains(err);
        self.errors |= err;
        first
    }

    pub fn reported(&self, err: ModeErrors) -> bool {
        self.errors.contains(err)
    }

    /// Count one argument-less letter against `cap`; false once over.
    pub fn take_simple(&mut self, cap: usize) -> bool {
        self.simple_used += 1;
        self.simple_used <= cap
    }

    /// Count one argument-consuming letter against `cap`; false once over.
    pub fn take_param(&mut self, cap: usize) -> bool {
        self.params_used += 1;
        self.params_used <= cap
    }

    /// A `-k` after a `+k` in the same command hides the key it set.
    pub fn blank_keys(&mut self) {
        for change in &mut self.changes {
            if change.letter == 'k' && change.dir == Direction::Add {
                change.arg = Some("*".to_string());
            }
        }
    }

    /// `+nt-k *`-style summary, used for logging.
    pub fn summary(&self) -> String {
        let mut letters = String::new();
        let mut args = Vec::new();
        let mut dir = Direction::Query;
        for change in &self.changes {
            if change.dir != dir {
                letters.push(change.dir.sign());
                dir = change.dir;
            }
            letters.push(change.letter);
            if let Some(arg) = &change.arg {
                args.push(arg.as_str());
            }
        }
        if args.is_empty() {
            letters
        } else {
            format!("{letters} {}", args.join(" "))
        }
    }
}
