//! Ban matching and join admission.
//!
//! Only locally connected clients are ever checked; a remote client's own
//! server has already made the decision. A verdict computed for a member is
//! cached on the membership together with the channel's ban generation, and
//! reused until a list change bumps the generation.

mod extban;
mod mask;

pub use extban::{Extban, ExtbanMatch, ExtbanMatcher, ExtbanRegistry};
pub use mask::{fix_key, fix_key_remote, pretty_mask};

use meshirc_proto::{irc_eq, match_cidr, wildcard_match};

use crate::error::JoinError;
use crate::metrics;
use crate::state::{
    CachedVerdict, Channel, ChannelId, ChannelModes, Client, ClientId, Handle, ListKind, Network,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    NotBanned,
    Banned,
    /// A ban matched, and so did an exception.
    Excepted,
}

/// The forms a client's identity is matched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// `nick!user@host`
    pub host: String,
    /// `nick!user@ip`
    pub ip: String,
    /// `nick!user@althost`, when the visible host hides the real one.
    pub alt: Option<String>,
}

impl Identity {
    pub fn of(client: &Client) -> Self {
        let prefix = format!("{}!{}@", client.nick, client.user);
        Self {
            host: format!("{prefix}{}", client.host),
            ip: format!("{prefix}{}", client.ip),
            alt: client.alt_host.as_ref().map(|h| format!("{prefix}{h}")),
        }
    }
}

impl Network {
    fn entry_matches(&self, mask: &str, id: &Identity, client: &Client, chan: &Channel) -> bool {
        wildcard_match(mask, &id.host)
            || wildcard_match(mask, &id.ip)
            || match_cidr(mask, &id.ip)
            || (mask.starts_with('$') && self.extbans.matches(mask, client, chan, self))
            || id.alt.as_deref().is_some_and(|alt| wildcard_match(mask, alt))
    }

    fn list_matches(&self, kind: ListKind, id: &Identity, client: &Client, chan: &Channel) -> bool {
        chan.list(kind)
            .iter()
            .any(|e| self.entry_matches(&e.mask, id, client, chan))
    }

    /// Match `client` against `kind`, then against the exception list.
    fn evaluate(&self, kind: ListKind, client: &Client, chan: &Channel) -> BanStatus {
        if chan.list(kind).is_empty() {
            return BanStatus::NotBanned;
        }
        metrics::record_ban_check();
        let id = Identity::of(client);
        if !self.list_matches(kind, &id, client, chan) {
            return BanStatus::NotBanned;
        }
        if self.config.channel.use_except && self.list_matches(ListKind::Except, &id, client, chan) {
            BanStatus::Excepted
        } else {
            BanStatus::Banned
        }
    }

    /// Ban verdict for `client` on `chan`. With a membership handle the
    /// verdict is cached against the current ban generation.
    pub fn ban_status(&mut self, client: ClientId, chan: ChannelId, member: Option<Handle>) -> BanStatus {
        let (Some(c), Some(ch)) = (self.clients.get(&client), self.channels.get(&chan)) else {
            return BanStatus::NotBanned;
        };
        if !c.is_local() {
            return BanStatus::NotBanned;
        }
        let generation = ch.bans_generation;
        if let Some(cached) = member
            .and_then(|h| self.members.get(h))
            .and_then(|m| m.cached_verdict(generation))
        {
            return cached;
        }

        let status = self.evaluate(ListKind::Ban, c, ch);
        if let Some(m) = member.and_then(|h| self.members.get_mut(h)) {
            m.ban_cache = Some(CachedVerdict { status, generation });
        }
        status
    }

    /// Quiet verdict; same matching as bans, never cached.
    pub fn is_quieted(&self, client: ClientId, chan: ChannelId) -> BanStatus {
        match (self.clients.get(&client), self.channels.get(&chan)) {
            (Some(c), Some(ch)) if c.is_local() => self.evaluate(ListKind::Quiet, c, ch),
            _ => BanStatus::NotBanned,
        }
    }

    /// Drop every cached verdict held by `client`.
    pub fn invalidate_ban_cache(&mut self, client: ClientId) {
        let Some(c) = self.clients.get(&client) else {
            return;
        };
        let handles: Vec<Handle> = c.channels.values().copied().collect();
        for handle in handles {
            if let Some(m) = self.members.get_mut(handle) {
                m.ban_cache = None;
            }
        }
    }

    /// Admission checks for a local client joining `chan`, followed by the
    /// join hooks.
    pub fn can_join(&self, client: ClientId, chan: ChannelId, key: Option<&str>) -> Result<(), JoinError> {
        let (Some(c), Some(ch)) = (self.clients.get(&client), self.channels.get(&chan)) else {
            return Ok(());
        };
        let verdict = self.admission(c, ch, key);
        self.run_join_hooks(client, chan, verdict)
    }

    fn admission(&self, c: &Client, ch: &Channel, key: Option<&str>) -> Result<(), JoinError> {
        if !c.is_local() {
            return Ok(());
        }
        if self.evaluate(ListKind::Ban, c, ch) == BanStatus::Banned {
            return Err(JoinError::Banned);
        }

        let invited = c.invites.contains(&ch.id);
        if ch.modes.contains(ChannelModes::INVITEONLY) && !invited {
            let invex = self.config.channel.use_invex
                && self.list_matches(ListKind::Invex, &Identity::of(c), c, ch);
            if !invex {
                return Err(JoinError::InviteOnly);
            }
        }

        if let Some(wanted) = &ch.params.key
            && !key.is_some_and(|k| irc_eq(wanted, k))
        {
            return Err(JoinError::BadKey);
        }

        if invited {
            return Ok(());
        }
        if let Some(limit) = ch.params.limit
            && ch.members.len() >= limit as usize
        {
            return Err(JoinError::Full);
        }
        if ch.modes.contains(ChannelModes::REGONLY) && c.account.is_none() {
            return Err(JoinError::NeedRegistered);
        }
        if ch.throttled(self.now()) {
            return Err(JoinError::Throttled);
        }
        Ok(())
    }

    /// Whether a client may speak in `chan`. Voiced members and chanops
    /// always may; everyone else is subject to `+n`, `+m`, bans and quiets.
    pub fn can_send(&mut self, client: ClientId, chan: ChannelId) -> bool {
        let Some(c) = self.clients.get(&client) else {
            return false;
        };
        if !c.is_local() {
            return true;
        }
        let Some(ch) = self.channels.get(&chan) else {
            return false;
        };
        let modes = ch.modes;
        let member = self.find_membership(chan, client);
        match member.and_then(|h| self.members.get(h)) {
            Some(m) if m.is_chanop() || m.is_voiced() => return true,
            Some(_) => {}
            None if modes.contains(ChannelModes::NOPRIVMSGS) => return false,
            None => {}
        }
        if modes.contains(ChannelModes::MODERATED) {
            return false;
        }
        self.ban_status(client, chan, member) != BanStatus::Banned
            && self.is_quieted(client, chan) != BanStatus::Banned
    }
}
