//! Server capabilities and the capability-combination index.
//!
//! Only a handful of capabilities change how channel modes are rendered to
//! a peer. Every combination of those is precomputed; each combination
//! counts the live links that have exactly that signature, so the batch
//! compiler only renders for signatures somebody actually has.

use bitflags::bitflags;

bitflags! {
    /// Capabilities negotiated with `CAPAB`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Caps: u32 {
        const QS = 1 << 0;
        const EX = 1 << 1;
        const CHW = 1 << 2;
        const IE = 1 << 3;
        const KLN = 1 << 4;
        const KNOCK = 1 << 5;
        const TB = 1 << 6;
        const UNKLN = 1 << 7;
        const CLUSTER = 1 << 8;
        const ENCAP = 1 << 9;
        const SERVICES = 1 << 10;
        const RSFNC = 1 << 11;
        const SAVE = 1 << 12;
        const EUID = 1 << 13;
        const MLOCK = 1 << 14;
        /// Implied by `PASS ... TS 6`, never sent as a token.
        const TS6 = 1 << 15;
    }
}

const CAP_TOKENS: [(&str, Caps); 15] = [
    ("QS", Caps::QS),
    ("EX", Caps::EX),
    ("CHW", Caps::CHW),
    ("IE", Caps::IE),
    ("KLN", Caps::KLN),
    ("KNOCK", Caps::KNOCK),
    ("TB", Caps::TB),
    ("UNKLN", Caps::UNKLN),
    ("CLUSTER", Caps::CLUSTER),
    ("ENCAP", Caps::ENCAP),
    ("SERVICES", Caps::SERVICES),
    ("RSFNC", Caps::RSFNC),
    ("SAVE", Caps::SAVE),
    ("EUID", Caps::EUID),
    ("MLOCK", Caps::MLOCK),
];

impl Caps {
    /// What this server advertises.
    pub fn ours() -> Self {
        Caps::QS
            | Caps::EX
            | Caps::CHW
            | Caps::IE
            | Caps::KNOCK
            | Caps::TB
            | Caps::ENCAP
            | Caps::SERVICES
            | Caps::EUID
            | Caps::MLOCK
    }

    /// Parse a space-separated CAPAB token list; unknown tokens are ignored.
    pub fn from_tokens(s: &str) -> Self {
        s.split_whitespace()
            .filter_map(|t| {
                CAP_TOKENS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(t))
            })
            .fold(Caps::empty(), |acc, (_, c)| acc | *c)
    }

    pub fn to_tokens(self) -> String {
        CAP_TOKENS
            .iter()
            .filter(|(_, c)| self.contains(*c))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Capabilities that affect channel mode rendering.
pub const CHANNEL_CAPS: [Caps; 4] = [Caps::EX, Caps::IE, Caps::SERVICES, Caps::TS6];

pub const NCHCAP_COMBOS: usize = 1 << CHANNEL_CAPS.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapCombo {
    /// Capabilities a peer in this combination has.
    pub yes: Caps,
    /// Tracked capabilities it lacks.
    pub no: Caps,
    /// Live links with this signature.
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct CapCombos {
    combos: [CapCombo; NCHCAP_COMBOS],
}

impl Default for CapCombos {
    fn default() -> Self {
        Self::new()
    }
}

impl CapCombos {
    pub fn new() -> Self {
        let combos = std::array::from_fn(|m| {
            let (mut yes, mut no) = (Caps::empty(), Caps::empty());
            for (bit, cap) in CHANNEL_CAPS.iter().enumerate() {
                if m & (1 << bit) == 0 {
                    no |= *cap;
                } else {
                    yes |= *cap;
                }
            }
            CapCombo { yes, no, count: 0 }
        });
        Self { combos }
    }

    /// Rebuild the counts from the current set of links.
    pub fn rebuild<I: IntoIterator<Item = Caps>>(links: I) -> Self {
        let mut index = Self::new();
        for caps in links {
            index.attach(caps);
        }
        index
    }

    fn slot(&self, caps: Caps) -> usize {
        self.combos
            .iter()
            .position(|c| caps.contains(c.yes) && !caps.intersects(c.no))
            .unwrap_or_default()
    }

    pub fn attach(&mut self, caps: Caps) {
        let slot = self.slot(caps);
        self.combos[slot].count += 1;
    }

    pub fn detach(&mut self, caps: Caps) {
        let slot = self.slot(caps);
        let combo = &mut self.combos[slot];
        combo.count = combo.count.saturating_sub(1);
    }

    /// Combinations with at least one live link.
    pub fn live(&self) -> impl Iterator<Item = &CapCombo> {
        self.combos.iter().filter(|c| c.count > 0)
    }

    pub fn total(&self) -> usize {
        self.combos.iter().map(|c| c.count).sum()
    }
}
