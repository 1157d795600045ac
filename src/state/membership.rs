//! Channel memberships.

use bitflags::bitflags;

use super::channel::ChannelId;
use super::client::ClientId;
use crate::bans::BanStatus;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemberFlags: u8 {
        const CHANOP = 1 << 0;
        const VOICE = 1 << 1;
    }
}

impl MemberFlags {
    /// Parse SJOIN status prefixes (`@`, `+`).
    pub fn from_prefixes(s: &str) -> (Self, &str) {
        let mut flags = Self::empty();
        let mut rest = s;
        loop {
            if let Some(r) = rest.strip_prefix('@') {
                flags |= Self::CHANOP;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('+') {
                flags |= Self::VOICE;
                rest = r;
            } else {
                return (flags, rest);
            }
        }
    }

    /// Every status prefix, highest first.
    pub fn prefixes(self) -> String {
        let mut out = String::new();
        if self.contains(Self::CHANOP) {
            out.push('@');
        }
        if self.contains(Self::VOICE) {
            out.push('+');
        }
        out
    }
}

/// A ban verdict and the list generation it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedVerdict {
    pub status: BanStatus,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Membership {
    pub channel: ChannelId,
    pub client: ClientId,
    pub flags: MemberFlags,
    pub ban_cache: Option<CachedVerdict>,
}

impl Membership {
    pub fn new(channel: ChannelId, client: ClientId, flags: MemberFlags) -> Self {
        Self {
            channel,
            client,
            flags,
            ban_cache: None,
        }
    }

    pub fn is_chanop(&self) -> bool {
        self.flags.contains(MemberFlags::CHANOP)
    }

    pub fn is_voiced(&self) -> bool {
        self.flags.contains(MemberFlags::VOICE)
    }

    /// Cached verdict, if it is still current for `generation`.
    pub fn cached_verdict(&self, generation: u64) -> Option<BanStatus> {
        self.ban_cache
            .filter(|c| c.generation == generation)
            .map(|c| c.status)
    }
}
