//! Per-letter mode handlers.

use crate::bans::{fix_key, fix_key_remote, pretty_mask};
use crate::propagate::{Caps, MODEBUFLEN};
use crate::replies;
use crate::state::{ChannelModes, ListKind, MemberFlags, Network, OperPrivs, Throttle, is_channel_name};

use super::{AccessLevel, Direction, ModeChange, ModeCtx, ModeErrors, Scope, Source};

const BANLEN: usize = 195;

/// Leading integer of `s`, C `atoi` style; 0 when there is none.
fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |n| sign * n)
}

/// `joins:seconds`, both positive.
fn parse_throttle(s: &str) -> Option<Throttle> {
    let (joins, seconds) = s.split_once(':')?;
    let starts_digit = |p: &str| p.trim_start_matches(['+', '-']).starts_with(|c: char| c.is_ascii_digit());
    if !starts_digit(joins) || !starts_digit(seconds) {
        return None;
    }
    let joins = u32::try_from(atoi(joins)).ok().filter(|n| *n > 0)?;
    let seconds = u32::try_from(atoi(seconds)).ok().filter(|n| *n > 0)?;
    Some(Throttle { joins, seconds })
}

impl Network {
    fn over_simple_cap(&self, ctx: &mut ModeCtx<'_>) -> bool {
        ctx.local && !ctx.batch.take_simple(self.config.limits.max_modes_simple)
    }

    fn over_param_cap(&self, ctx: &mut ModeCtx<'_>) -> bool {
        ctx.local && !ctx.batch.take_param(self.config.limits.max_mode_params)
    }

    fn channel_name(&self, ctx: &ModeCtx<'_>) -> String {
        self.channel(ctx.chan)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    pub(super) fn chm_nosuch(&self, ctx: &mut ModeCtx<'_>, c: char) {
        if ctx.batch.first_report(ModeErrors::UNKNOWN) {
            self.mode_reply(ctx, replies::ERR_UNKNOWNMODE, &format!("{c} :is unknown mode char to me"));
        }
    }

    /// Set or clear a flag, recording the change unless it is redundant.
    fn toggle_flag(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char, flag: ChannelModes, caps: Caps) {
        let Some(channel) = self.channel_mut(ctx.chan) else {
            return;
        };
        let set = channel.modes.contains(flag);
        match dir {
            Direction::Add if !set => channel.modes |= flag,
            Direction::Del if set => channel.modes.remove(flag),
            _ => return,
        }
        ctx.batch.push(ModeChange::new(c, dir, None).with_caps(caps));
    }

    pub(super) fn chm_simple(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char, flag: ChannelModes) {
        if !self.allow_change(ctx, c) || self.over_simple_cap(ctx) {
            return;
        }
        if dir == Direction::Add
            && ctx.local
            && !self.config.channel.use_forward
            && matches!(c, 'Q' | 'F')
        {
            return;
        }
        self.toggle_flag(ctx, dir, c, flag, Caps::empty());
    }

    /// `+r`: a plain flag that only peers with services support see.
    pub(super) fn chm_service(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char, flag: ChannelModes) {
        if !self.allow_change(ctx, c) || self.over_simple_cap(ctx) {
            return;
        }
        self.toggle_flag(ctx, dir, c, flag, Caps::SERVICES);
    }

    pub(super) fn chm_staff(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        dir: Direction,
        c: char,
        flag: ChannelModes,
        privs: OperPrivs,
    ) {
        if ctx.local {
            let allowed = ctx
                .client()
                .and_then(|id| self.client(id))
                .is_some_and(|cl| cl.is_oper() && cl.privs.contains(privs));
            if !allowed {
                if ctx.batch.first_report(ModeErrors::NOPRIVS) {
                    self.mode_reply(
                        ctx,
                        replies::ERR_NOPRIVILEGES,
                        ":Permission Denied - You're not an IRC operator",
                    );
                }
                return;
            }
        }
        if !self.allow_change_at(ctx, c, AccessLevel::Chanop) || self.over_simple_cap(ctx) {
            return;
        }
        self.toggle_flag(ctx, dir, c, flag, Caps::empty());
    }

    pub(super) fn chm_list(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char, kind: ListKind) {
        let use_except = self.config.channel.use_except;
        let use_invex = self.config.channel.use_invex;
        let (shown, caps, scope) = match kind {
            ListKind::Ban => (ModeErrors::RPL_BANLIST, Caps::empty(), Scope::AllMembers),
            ListKind::Quiet => (ModeErrors::RPL_QUIETLIST, Caps::empty(), Scope::AllMembers),
            ListKind::Except | ListKind::Invex => {
                let (enabled, shown, caps) = if kind == ListKind::Except {
                    (use_except, ModeErrors::RPL_EXCEPTLIST, Caps::EX)
                } else {
                    (use_invex, ModeErrors::RPL_INVITELIST, Caps::IE)
                };
                if !enabled && ctx.local && dir == Direction::Add && ctx.has_arg() {
                    return;
                }
                let scope = if enabled || dir == Direction::Del {
                    Scope::ChanOps
                } else {
                    Scope::ServersOnly
                };
                (shown, caps, scope)
            }
        };

        if dir == Direction::Query || !ctx.has_arg() {
            self.show_list(ctx, kind, shown);
            return;
        }
        if !self.allow_change(ctx, c) || self.over_param_cap(ctx) {
            return;
        }

        let Some(raw) = ctx.next_arg() else {
            return;
        };
        let raw = raw.to_string();
        if raw.is_empty() || raw.starts_with(':') {
            return;
        }
        let mask = if ctx.local {
            pretty_mask(&raw)
        } else if raw.contains(' ') {
            return;
        } else {
            raw.clone()
        };
        let name = self.channel_name(ctx);
        if mask.len() > BANLEN.min(MODEBUFLEN - 5) {
            self.mode_reply(ctx, replies::ERR_INVALIDBAN, &format!("{name} {c} {raw} :Invalid ban mask"));
            return;
        }

        match dir {
            Direction::Add => {
                if ctx.local && mask.starts_with('$') && !self.extban_settable(ctx, &mask) {
                    self.mode_reply(ctx, replies::ERR_INVALIDBAN, &format!("{name} {c} {raw} :Invalid ban mask"));
                    return;
                }
                if !self.add_list_entry(ctx, kind, &mask) {
                    return;
                }
                ctx.batch
                    .push(ModeChange::new(c, dir, Some(mask)).with_caps(caps).with_scope(scope));
            }
            Direction::Del => {
                let Some(channel) = self.channel_mut(ctx.chan) else {
                    return;
                };
                let removed = if channel.list_mut(kind).remove(&mask).is_some() {
                    Some(mask.clone())
                } else if channel.list_mut(kind).remove(&raw).is_some() {
                    Some(raw)
                } else {
                    None
                };
                if removed.is_some() {
                    channel.list_changed();
                }
                let arg = removed.unwrap_or(mask);
                ctx.batch
                    .push(ModeChange::new(c, dir, Some(arg)).with_caps(caps).with_scope(scope));
            }
            Direction::Query => {}
        }
    }

    /// Dump one list to the invoker, once per command.
    fn show_list(&self, ctx: &mut ModeCtx<'_>, kind: ListKind, shown: ModeErrors) {
        if !ctx.batch.first_report(shown) {
            return;
        }
        let Some(channel) = self.channel(ctx.chan) else {
            return;
        };
        let name = channel.name.clone();
        let needed = match kind {
            ListKind::Ban | ListKind::Quiet => AccessLevel::Peon,
            ListKind::Except | ListKind::Invex => AccessLevel::Chanop,
        };
        let alevel = ctx.alevel;
        if !self.require_access(ctx, alevel, needed) {
            return;
        }
        let (entry_code, end_code, end_text) = kind.replies();
        let entries: Vec<String> = channel
            .list(kind)
            .iter()
            .map(|e| format!("{name} {} {} {}", e.mask, e.set_by, e.set_at))
            .collect();
        for entry in entries {
            self.mode_reply(ctx, entry_code, &entry);
        }
        self.mode_reply(ctx, end_code, &format!("{name} :{end_text}"));
    }

    fn extban_settable(&self, ctx: &ModeCtx<'_>, mask: &str) -> bool {
        let (Some(client), Some(channel)) = (
            ctx.client().and_then(|id| self.client(id)),
            self.channel(ctx.chan),
        ) else {
            return false;
        };
        self.extbans.is_valid(mask, client, channel, self)
    }

    /// Local sources are held to the list ceiling and may not add a mask an
    /// existing entry already covers; peers only may not add exact duplicates.
    fn add_list_entry(&mut self, ctx: &mut ModeCtx<'_>, kind: ListKind, mask: &str) -> bool {
        let set_by = match ctx.source {
            Source::Client(id) => self.client(*id).map(|c| c.hostmask()),
            Source::Server(sid) => self.topology.get(sid).map(|s| s.name.clone()),
        }
        .unwrap_or_else(|| self.name().to_string());
        let now = self.now();
        let (max_bans, max_bans_large) = (self.config.limits.max_bans, self.config.limits.max_bans_large);

        let Some(channel) = self.channel(ctx.chan) else {
            return false;
        };
        if ctx.local {
            let max = if channel.modes.contains(ChannelModes::EXLIMIT) {
                max_bans_large
            } else {
                max_bans
            };
            if channel.list_total() >= max {
                let rest = format!("{} {mask} :Channel ban list is full", channel.name);
                if ctx.batch.first_report(ModeErrors::BANLIST_FULL) {
                    self.mode_reply(ctx, replies::ERR_BANLISTFULL, &rest);
                }
                return false;
            }
            if channel.list(kind).covers(mask) {
                return false;
            }
        } else if channel.list(kind).contains_exact(mask) {
            return false;
        }

        let Some(channel) = self.channel_mut(ctx.chan) else {
            return false;
        };
        channel.list_mut(kind).push(mask.to_string(), set_by, now);
        channel.list_changed();
        true
    }

    /// `+o` and `+v`.
    pub(super) fn chm_status(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        if !self.allow_change(ctx, c) || dir == Direction::Query {
            return;
        }
        let Some(target_name) = ctx.next_arg().map(str::to_string) else {
            return;
        };
        if target_name.is_empty() {
            self.mode_reply(ctx, replies::ERR_NOSUCHNICK, "* :No such nick/channel");
            return;
        }
        let target = if ctx.local {
            self.chase_nick(&target_name)
        } else {
            self.find_client(&target_name)
                .or_else(|| self.chase_nick(&target_name))
        };
        let Some(target) = target else {
            self.mode_reply(ctx, replies::ERR_NOSUCHNICK, &format!("{target_name} :No such nick/channel"));
            return;
        };
        let Some(handle) = self.find_membership(ctx.chan, target) else {
            if ctx.batch.first_report(ModeErrors::USERNOTINCHANNEL) {
                let rest = format!("{target_name} {} :They aren't on that channel", self.channel_name(ctx));
                self.mode_reply(ctx, replies::ERR_USERNOTINCHANNEL, &rest);
            }
            return;
        };
        if self.over_param_cap(ctx) {
            return;
        }

        let flag = if c == 'o' { MemberFlags::CHANOP } else { MemberFlags::VOICE };
        let Some((nick, uid, is_service)) = self
            .client(target)
            .map(|t| (t.nick.clone(), t.uid.clone(), t.is_service()))
        else {
            return;
        };
        if dir == Direction::Add && ctx.local && ctx.client() == Some(target) && c == 'o' {
            return;
        }
        if dir == Direction::Del && c == 'o' && ctx.local && is_service {
            let rest = format!("{nick} {} :Cannot kick or deop a network service", self.channel_name(ctx));
            self.mode_reply(ctx, replies::ERR_ISCHANSERVICE, &rest);
            return;
        }
        let Some(member) = self.membership_mut(handle) else {
            return;
        };
        match dir {
            Direction::Add if !member.flags.contains(flag) => member.flags |= flag,
            Direction::Del if member.flags.contains(flag) => member.flags.remove(flag),
            _ => return,
        }
        ctx.batch.push(ModeChange::new(c, dir, Some(nick)).with_id(uid));
    }

    pub(super) fn chm_limit(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        if !self.allow_change(ctx, c) || dir == Direction::Query || self.over_simple_cap(ctx) {
            return;
        }
        match dir {
            Direction::Add => {
                let Some(arg) = ctx.next_arg() else {
                    return;
                };
                let Ok(limit) = u32::try_from(atoi(arg)) else {
                    return;
                };
                if limit == 0 {
                    return;
                }
                if let Some(channel) = self.channel_mut(ctx.chan) {
                    channel.params.limit = Some(limit);
                    ctx.batch.push(ModeChange::new(c, dir, Some(limit.to_string())));
                }
            }
            Direction::Del => {
                if let Some(channel) = self.channel_mut(ctx.chan)
                    && channel.params.limit.take().is_some()
                {
                    ctx.batch.push(ModeChange::new(c, dir, None));
                }
            }
            Direction::Query => {}
        }
    }

    pub(super) fn chm_throttle(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        if !self.allow_change(ctx, c) || dir == Direction::Query || self.over_simple_cap(ctx) {
            return;
        }
        match dir {
            Direction::Add => {
                // A malformed argument is left for the next letter.
                let Some(throttle) = ctx.peek_arg().and_then(parse_throttle) else {
                    return;
                };
                ctx.next_arg();
                if let Some(channel) = self.channel_mut(ctx.chan) {
                    channel.params.throttle = Some(throttle);
                    let arg = format!("{}:{}", throttle.joins, throttle.seconds);
                    ctx.batch.push(ModeChange::new(c, dir, Some(arg)));
                }
            }
            Direction::Del => {
                if let Some(channel) = self.channel_mut(ctx.chan)
                    && channel.params.throttle.take().is_some()
                {
                    channel.reset_throttle();
                    ctx.batch.push(ModeChange::new(c, dir, None));
                }
            }
            Direction::Query => {}
        }
    }

    pub(super) fn chm_forward(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        let use_forward = self.config.channel.use_forward;
        if !use_forward && ctx.local && dir == Direction::Add && ctx.has_arg() {
            return;
        }
        if dir == Direction::Query || (dir == Direction::Add && !ctx.has_arg()) {
            if ctx.local && ctx.batch.first_report(ModeErrors::RPL_FORWARD) {
                let Some(channel) = self.channel(ctx.chan) else {
                    return;
                };
                let text = match &channel.params.forward {
                    Some(target) => format!("{} forward channel is {target}", channel.name),
                    None => format!("{} has no forward channel", channel.name),
                };
                let line = format!(":{} NOTICE {} :{text}", self.name(), ctx.nick);
                ctx.batch.replies.push(line);
            }
            return;
        }
        if !self.allow_change(ctx, c) || self.over_simple_cap(ctx) {
            return;
        }
        match dir {
            Direction::Add => {
                let Some(target) = ctx.next_arg().map(str::to_string) else {
                    return;
                };
                if target.is_empty() || !self.check_forward(ctx, &target) {
                    return;
                }
                let scope = if use_forward { Scope::AllMembers } else { Scope::ServersOnly };
                if let Some(channel) = self.channel_mut(ctx.chan) {
                    channel.params.forward = Some(target.clone());
                    ctx.batch
                        .push(ModeChange::new(c, dir, Some(target)).with_scope(scope));
                }
            }
            Direction::Del => {
                if let Some(channel) = self.channel_mut(ctx.chan)
                    && channel.params.forward.take().is_some()
                {
                    ctx.batch.push(ModeChange::new(c, dir, None));
                }
            }
            Direction::Query => {}
        }
    }

    /// A forward target must be a valid name, `#` channels may not forward
    /// to `&` ones, and a local setter needs the target to exist and be
    /// `+F` or to hold chanop there.
    fn check_forward(&self, ctx: &mut ModeCtx<'_>, target: &str) -> bool {
        let name = self.channel_name(ctx);
        if !is_channel_name(target) || (name.starts_with('#') && target.starts_with('&')) {
            if ctx.batch.first_report(ModeErrors::BAD_FORWARD) {
                self.mode_reply(ctx, replies::ERR_BADCHANNAME, &format!("{target} :Illegal channel name"));
            }
            return false;
        }
        if !ctx.local {
            return true;
        }
        let Some(forward) = self.find_channel(target) else {
            if ctx.batch.first_report(ModeErrors::BAD_FORWARD) {
                self.mode_reply(ctx, replies::ERR_NOSUCHCHANNEL, &format!("{target} :No such channel"));
            }
            return false;
        };
        let free = self
            .channel(forward)
            .is_some_and(|ch| ch.modes.contains(ChannelModes::FREETARGET));
        let chanop = ctx
            .client()
            .and_then(|id| self.member_flags(forward, id))
            .is_some_and(|f| f.contains(MemberFlags::CHANOP));
        if !free && !chanop {
            if ctx.batch.first_report(ModeErrors::BAD_FORWARD) {
                self.mode_reply(ctx, replies::ERR_CHANOPRIVSNEEDED, &format!("{target} :You're not channel operator"));
            }
            return false;
        }
        true
    }

    pub(super) fn chm_key(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        if !self.allow_change(ctx, c) || dir == Direction::Query || self.over_simple_cap(ctx) {
            return;
        }
        let max_len = self.config.channel.max_key_len;
        match dir {
            Direction::Add => {
                let Some(raw) = ctx.next_arg() else {
                    return;
                };
                let key = if ctx.local {
                    fix_key(raw, max_len)
                } else {
                    fix_key_remote(raw, max_len)
                };
                if key.is_empty() {
                    return;
                }
                if let Some(channel) = self.channel_mut(ctx.chan) {
                    channel.params.key = Some(key.clone());
                    ctx.batch.push(ModeChange::new(c, dir, Some(key)));
                }
            }
            Direction::Del => {
                ctx.next_arg();
                let Some(channel) = self.channel_mut(ctx.chan) else {
                    return;
                };
                if channel.params.key.take().is_none() {
                    return;
                }
                ctx.batch.blank_keys();
                ctx.batch.push(ModeChange::new(c, dir, Some("*".to_string())));
            }
            Direction::Query => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoi_reads_leading_integer() {
        assert_eq!(atoi("42"), 42);
        assert_eq!(atoi("  7abc"), 7);
        assert_eq!(atoi("-3"), -3);
        assert_eq!(atoi("abc"), 0);
        assert_eq!(atoi(""), 0);
    }

    #[test]
    fn throttle_needs_two_positive_numbers() {
        assert_eq!(parse_throttle("5:10"), Some(Throttle { joins: 5, seconds: 10 }));
        assert_eq!(parse_throttle("5:0"), None);
        assert_eq!(parse_throttle("-1:10"), None);
        assert_eq!(parse_throttle("5"), None);
        assert_eq!(parse_throttle("x:10"), None);
    }
}
