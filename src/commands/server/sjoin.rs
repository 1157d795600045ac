//! SJOIN and the timestamp rules shared with server JOIN.
//!
//! The side with the older channel timestamp wins. A peer with a lower ts
//! takes the channel over: our statuses, flags, parameters and lists go.
//! With equal timestamps both sides merge. A peer with a higher ts only
//! contributes members, without their statuses.

use std::cmp::Ordering;

use meshirc_proto::{Line, irc_to_lower};
use tracing::{debug, info};

use super::super::burst::pack_tokens;
use super::super::{ServerContext, ServerHandler};
use super::{display_prefix, need, parse_ts};
use crate::error::LinkError;
use crate::modes::{Direction, ModeChange, Scope};
use crate::propagate::{Audience, Caps, render_local};
use crate::state::{
    ChannelId, ChannelModes, ListKind, MODE_LETTERS, MemberFlags, ModeParams, Network, Throttle,
    is_channel_name,
};

/// Flags and parameters as carried by SJOIN and JOIN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ChannelState {
    pub modes: ChannelModes,
    pub params: ModeParams,
}

impl ChannelState {
    /// Parse `+ntk key`-style state. `None` when a parameter letter is
    /// missing its argument. A lone `0` means no modes.
    pub fn parse(letters: &str, args: &[&str]) -> Option<Self> {
        let mut state = Self::default();
        let mut args = args.iter().copied();
        for c in letters.chars() {
            match c {
                'k' => state.params.key = Some(args.next()?.to_string()).filter(|k| !k.is_empty()),
                'l' => state.params.limit = args.next()?.parse().ok().filter(|l| *l > 0),
                'j' => state.params.throttle = parse_throttle(args.next()?),
                'f' => state.params.forward = Some(args.next()?.to_string()).filter(|f| is_channel_name(f)),
                _ => {
                    if let Some(flag) = ChannelModes::from_letter(c) {
                        state.modes |= flag;
                    }
                }
            }
        }
        Some(state)
    }

    /// Equal timestamps: flags are unioned and each parameter resolves the
    /// same way on both sides, so the two servers converge.
    fn merge(&self, ours: &Self) -> Self {
        let forward = match (&self.params.forward, &ours.params.forward) {
            (Some(a), Some(b)) if irc_to_lower(b) > irc_to_lower(a) => Some(b.clone()),
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let throttle = match (self.params.throttle, ours.params.throttle) {
            (Some(a), Some(b)) => Some(if (b.joins, b.seconds) > (a.joins, a.seconds) { b } else { a }),
            (a, b) => a.or(b),
        };
        Self {
            modes: self.modes | ours.modes,
            params: ModeParams {
                key: self.params.key.clone().max(ours.params.key.clone()),
                limit: self.params.limit.max(ours.params.limit),
                throttle,
                forward,
            },
        }
    }

    /// Changes that turn `old` into `self`: flags set, flags cleared,
    /// parameters cleared, then parameters set.
    fn diff(&self, old: &Self, with_forward: bool) -> Vec<ModeChange> {
        let mut out = Vec::new();
        for (letter, flag) in MODE_LETTERS {
            if self.modes.contains(flag) && !old.modes.contains(flag) {
                out.push(ModeChange::new(letter, Direction::Add, None));
            }
        }
        for (letter, flag) in MODE_LETTERS {
            if old.modes.contains(flag) && !self.modes.contains(flag) {
                out.push(ModeChange::new(letter, Direction::Del, None));
            }
        }

        let (new, old) = (&self.params, &old.params);
        if old.limit.is_some() && new.limit.is_none() {
            out.push(ModeChange::new('l', Direction::Del, None));
        }
        if let Some(key) = &old.key
            && new.key.is_none()
        {
            out.push(ModeChange::new('k', Direction::Del, Some(key.clone())));
        }
        if old.throttle.is_some() && new.throttle.is_none() {
            out.push(ModeChange::new('j', Direction::Del, None));
        }
        if old.forward.is_some() && new.forward.is_none() {
            out.push(ModeChange::new('f', Direction::Del, None));
        }
        if let Some(limit) = new.limit
            && old.limit != Some(limit)
        {
            out.push(ModeChange::new('l', Direction::Add, Some(limit.to_string())));
        }
        if let Some(key) = &new.key
            && old.key.as_ref() != Some(key)
        {
            out.push(ModeChange::new('k', Direction::Add, Some(key.clone())));
        }
        if let Some(t) = new.throttle
            && old.throttle != Some(t)
        {
            out.push(ModeChange::new('j', Direction::Add, Some(format!("{}:{}", t.joins, t.seconds))));
        }
        if let Some(forward) = &new.forward
            && old.forward.as_ref() != Some(forward)
            && with_forward
        {
            out.push(ModeChange::new('f', Direction::Add, Some(forward.clone())));
        }
        out
    }
}

fn parse_throttle(raw: &str) -> Option<Throttle> {
    let (joins, seconds) = raw.split_once(':')?;
    let t = Throttle {
        joins: joins.parse().ok()?,
        seconds: seconds.parse().ok()?,
    };
    (t.joins > 0 && t.seconds > 0).then_some(t)
}

impl Network {
    /// Settle `chan` against a peer's timestamp and mode state, telling
    /// local members what changed. Returns whether the peer's statuses
    /// stand.
    pub(super) fn reconcile_channel(
        &mut self,
        chan: ChannelId,
        created: bool,
        ts: i64,
        theirs: &ChannelState,
        source_name: &str,
    ) -> bool {
        let Some(ch) = self.channel(chan) else {
            return false;
        };
        let old_ts = ch.ts;
        let ours = ChannelState {
            modes: ch.modes,
            params: ch.params.clone(),
        };

        let order = if created { Ordering::Equal } else { ts.cmp(&old_ts) };
        let (keep_ours, keep_theirs) = match order {
            Ordering::Less => (false, true),
            Ordering::Equal => (true, true),
            Ordering::Greater => (true, false),
        };
        let target = match (keep_ours, keep_theirs) {
            (true, false) => ours.clone(),
            (true, true) if !created => theirs.merge(&ours),
            _ => theirs.clone(),
        };

        let changes = target.diff(&ours, self.config.channel.use_forward);
        if let Some(ch) = self.channel_mut(chan) {
            if !keep_ours {
                ch.ts = ts;
            }
            if keep_theirs && !keep_ours && target.params.throttle.is_none() {
                ch.reset_throttle();
            }
            ch.modes = target.modes;
            ch.params = target.params;
        }

        if !keep_ours {
            self.strip_statuses(chan);
            for c in self.clients.values_mut() {
                c.invites.remove(&chan);
            }
            let me = self.name().to_string();
            let name = self.channel(chan).map(|c| c.name.clone()).unwrap_or_default();
            let notice = format!(":{me} NOTICE {name} :*** Notice -- TS for {name} changed from {old_ts} to {ts}");
            self.send_to_channel_local(chan, Audience::AllMembers, None, &notice);
            info!(channel = %name, old_ts, new_ts = ts, "channel timestamp lowered by peer");
        }
        if !changes.is_empty() {
            self.send_mode_changes(chan, &changes, source_name);
        }
        if !keep_ours {
            self.drop_lists(chan, source_name);
        }
        keep_theirs
    }

    /// Take op and voice from every member.
    fn strip_statuses(&mut self, chan: ChannelId) {
        let Some(ch) = self.channel(chan) else {
            return;
        };
        let holders: Vec<_> = ch
            .members
            .iter()
            .filter_map(|(id, handle)| {
                let m = self.membership(*handle)?;
                (!m.flags.is_empty()).then_some((*id, *handle, m.flags))
            })
            .collect();
        let mut changes = Vec::new();
        for (id, handle, flags) in holders {
            let nick = self.client(id).map(|c| c.nick.clone()).unwrap_or_default();
            if flags.contains(MemberFlags::CHANOP) {
                changes.push(ModeChange::new('o', Direction::Del, Some(nick.clone())));
            }
            if flags.contains(MemberFlags::VOICE) {
                changes.push(ModeChange::new('v', Direction::Del, Some(nick)));
            }
            if let Some(m) = self.membership_mut(handle) {
                m.flags = MemberFlags::empty();
            }
        }
        if !changes.is_empty() {
            let me = self.name().to_string();
            self.send_mode_changes(chan, &changes, &me);
        }
    }

    /// Empty every list, showing the removals to the members who could see
    /// the entries.
    fn drop_lists(&mut self, chan: ChannelId, source_name: &str) {
        let Some(ch) = self.channel(chan) else {
            return;
        };
        if !ch.has_lists() {
            return;
        }
        let mut changes = Vec::new();
        for kind in ListKind::ALL {
            let scope = match kind {
                ListKind::Except | ListKind::Invex => Scope::ChanOps,
                ListKind::Ban | ListKind::Quiet => Scope::AllMembers,
            };
            for entry in ch.list(kind).iter() {
                changes.push(ModeChange::new(kind.letter(), Direction::Del, Some(entry.mask.clone())).with_scope(scope));
            }
        }
        if let Some(ch) = self.channel_mut(chan) {
            ch.clear_lists();
        }
        self.send_mode_changes(chan, &changes, source_name);
    }

    pub(super) fn send_mode_changes(&mut self, chan: ChannelId, changes: &[ModeChange], source_name: &str) {
        let Some(name) = self.channel(chan).map(|c| c.name.clone()) else {
            return;
        };
        let lines = render_local(changes, source_name, &name);
        for line in &lines.all {
            self.send_to_channel_local(chan, Audience::AllMembers, None, line);
        }
        for line in &lines.chanops {
            self.send_to_channel_local(chan, Audience::ChanOps, None, line);
        }
    }
}

/// `:<sid> SJOIN <ts> <chan> <modes> [<params>...] :<members>`
pub struct SjoinHandler;

impl ServerHandler for SjoinHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 4)?;
        let ts = parse_ts(line, line.params[0])?;
        let name = line.params[1];
        let modes = line.params[2];
        let last = line.params.len() - 1;
        let (args, members) = (&line.params[3..last], line.params[last]);
        if !is_channel_name(name) || name.starts_with('&') {
            return Ok(());
        }
        let Some(theirs) = ChannelState::parse(modes, args) else {
            debug!(channel = %name, %modes, "SJOIN mode parameter missing");
            return Ok(());
        };

        let (chan, created) = net.get_or_create_channel(name, ts);
        let source_name = display_prefix(net, &ctx.source);
        let keep_theirs = net.reconcile_channel(chan, created, ts, &theirs, &source_name);

        let mut tokens = Vec::new();
        let mut statuses = Vec::new();
        let mut joins = 0;
        for token in members.split_whitespace() {
            let (flags, uid) = MemberFlags::from_prefixes(token);
            let Some(id) = net.find_uid(uid) else {
                continue;
            };
            let Some((mask, nick, via)) = net.client(id).map(|c| (c.hostmask(), c.nick.clone(), c.link())) else {
                continue;
            };
            if via != Some(ctx.link) {
                debug!(channel = %name, %uid, "SJOIN member from the wrong direction");
                continue;
            }
            let flags = if keep_theirs { flags } else { MemberFlags::empty() };
            tokens.push(format!("{}{uid}", flags.prefixes()));

            if !net.is_member(chan, id) {
                net.add_member(chan, id, flags);
                let chname = net.channel(chan).map(|c| c.name.clone()).unwrap_or_default();
                net.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} JOIN {chname}"));
                joins += 1;
            } else if let Some(handle) = net.find_membership(chan, id)
                && let Some(m) = net.membership_mut(handle)
            {
                m.flags |= flags;
            }
            if flags.contains(MemberFlags::CHANOP) {
                statuses.push(ModeChange::new('o', Direction::Add, Some(nick.clone())));
            }
            if flags.contains(MemberFlags::VOICE) {
                statuses.push(ModeChange::new('v', Direction::Add, Some(nick)));
            }
        }
        if !statuses.is_empty() {
            net.send_mode_changes(chan, &statuses, &source_name);
        }

        let Some(ch) = net.channel(chan) else {
            return Ok(());
        };
        if joins == 0 && !ch.modes.contains(ChannelModes::PERMANENT) {
            if created {
                net.destroy_channel(chan);
            }
            return Ok(());
        }

        let modes = if modes != "0" && keep_theirs {
            ch.mode_string(true)
        } else {
            "0".to_string()
        };
        let prefix = format!(":{} SJOIN {} {} {modes} :", ctx.source, ch.ts, ch.name);
        let mut lines = pack_tokens(&prefix, tokens);
        if lines.is_empty() {
            lines.push(prefix);
        }
        let b = net.broadcast(Some(ctx.link));
        net.relay(&b, Caps::TS6, Caps::empty(), &lines);
        Ok(())
    }
}
