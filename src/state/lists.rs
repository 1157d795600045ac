//! Ban-like lists: bans, exceptions, invite exceptions, quiets.

use meshirc_proto::{irc_eq, mask_match};

use crate::replies;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Ban,
    Except,
    Invex,
    Quiet,
}

impl ListKind {
    pub const ALL: [ListKind; 4] = [
        ListKind::Ban,
        ListKind::Except,
        ListKind::Invex,
        ListKind::Quiet,
    ];

    pub fn index(self) -> usize {
        match self {
            ListKind::Ban => 0,
            ListKind::Except => 1,
            ListKind::Invex => 2,
            ListKind::Quiet => 3,
        }
    }

    pub fn letter(self) -> char {
        match self {
            ListKind::Ban => 'b',
            ListKind::Except => 'e',
            ListKind::Invex => 'I',
            ListKind::Quiet => 'q',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.letter() == c)
    }

    /// Numerics for one entry and for the end of a list dump.
    pub fn replies(self) -> (u16, u16, &'static str) {
        match self {
            ListKind::Ban => (
                replies::RPL_BANLIST,
                replies::RPL_ENDOFBANLIST,
                "End of Channel Ban List",
            ),
            ListKind::Except => (
                replies::RPL_EXCEPTLIST,
                replies::RPL_ENDOFEXCEPTLIST,
                "End of Channel Exception List",
            ),
            ListKind::Invex => (
                replies::RPL_INVITELIST,
                replies::RPL_ENDOFINVITELIST,
                "End of Channel Invite List",
            ),
            ListKind::Quiet => (
                replies::RPL_QUIETLIST,
                replies::RPL_ENDOFQUIETLIST,
                "End of Channel Quiet List",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub mask: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Ordered entries of one list, oldest first.
#[derive(Debug, Clone, Default)]
pub struct BanList {
    entries: Vec<ListEntry>,
}

impl BanList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListEntry> {
        self.entries.iter()
    }

    /// Exact, case-insensitive lookup.
    pub fn contains_exact(&self, mask: &str) -> bool {
        self.entries.iter().any(|e| irc_eq(&e.mask, mask))
    }

    /// Whether an existing entry already covers `mask`.
    pub fn covers(&self, mask: &str) -> bool {
        self.entries.iter().any(|e| mask_match(&e.mask, mask))
    }

    pub fn push(&mut self, mask: String, set_by: String, set_at: i64) {
        self.entries.push(ListEntry {
            mask,
            set_by,
            set_at,
        });
    }

    /// Remove the entry equal to `mask`, case-insensitively.
    pub fn remove(&mut self, mask: &str) -> Option<ListEntry> {
        let pos = self.entries.iter().position(|e| irc_eq(&e.mask, mask))?;
        Some(self.entries.remove(pos))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
