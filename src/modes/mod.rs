//! Channel mode dispatch.
//!
//! A mode string is walked letter by letter with a running direction.
//! Each letter's handler checks privilege, takes at most one argument,
//! changes channel state and appends a record to the command's
//! [`ModeBatch`]. Once the string is consumed, the batch is rendered for
//! local members and for every live capability combination of peers.

mod batch;
mod handlers;
mod lock;
mod table;


pub use batch::{Direction, ModeBatch, ModeChange, ModeErrors, Scope};
pub use table::{ModeHandler, ModeTable};

use tracing::debug;

use crate::metrics;
use crate::propagate::{Audience, CapCombo, LinkId, render_local, render_remote};
use crate::replies::{self, numeric};
use crate::state::{ChannelId, ClientId, Network};

/// Who issued a mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Client(ClientId),
    /// A server, by SID.
    Server(String),
}

/// Privilege a source holds on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    None,
    Peon,
    Chanop,
}

/// State threaded through the handlers of one command.
pub(crate) struct ModeCtx<'a> {
    pub source: &'a Source,
    /// Source is a locally connected client.
    pub local: bool,
    pub alevel: AccessLevel,
    pub chan: ChannelId,
    /// Name replies are addressed to.
    pub nick: String,
    args: &'a [&'a str],
    next: usize,
    pub batch: ModeBatch,
}

impl<'a> ModeCtx<'a> {
    pub fn has_arg(&self) -> bool {
        self.next < self.args.len()
    }

    pub fn next_arg(&mut self) -> Option<&'a str> {
        let arg = self.args.get(self.next).copied();
        if arg.is_some() {
            self.next += 1;
        }
        arg
    }

    pub fn peek_arg(&self) -> Option<&'a str> {
        self.args.get(self.next).copied()
    }

    pub fn client(&self) -> Option<ClientId> {
        match self.source {
            Source::Client(id) => Some(*id),
            Source::Server(_) => None,
        }
    }
}

impl Network {
    /// Access level for `source` on `chan`. Servers and remote clients are
    /// trusted as chanops; local clients get their membership status,
    /// adjusted by the access hooks.
    pub fn channel_access(&self, source: &Source, chan: ChannelId) -> AccessLevel {
        let Source::Client(client) = source else {
            return AccessLevel::Chanop;
        };
        if !self.client(*client).is_some_and(|c| c.is_local()) {
            return AccessLevel::Chanop;
        }
        let level = match self.find_membership(chan, *client).and_then(|h| self.membership(h)) {
            None => AccessLevel::None,
            Some(m) if m.is_chanop() => AccessLevel::Chanop,
            Some(_) => AccessLevel::Peon,
        };
        self.run_access_hooks(*client, chan, level)
    }

    /// Apply `modes` with positional `args` to `chan`, tell local members and
    /// propagate to peers. `from` is the link the command arrived on.
    pub fn set_channel_mode(
        &mut self,
        from: Option<LinkId>,
        source: &Source,
        chan: ChannelId,
        modes: &str,
        args: &[&str],
    ) -> ModeBatch {
        if !self.channels.contains_key(&chan) {
            return ModeBatch::new();
        }
        let (local, nick) = match source {
            Source::Client(id) => self
                .client(*id)
                .map(|c| (c.is_local(), c.nick.clone()))
                .unwrap_or_default(),
            Source::Server(sid) => (false, sid.clone()),
        };
        let mut ctx = ModeCtx {
            source,
            local,
            alevel: self.channel_access(source, chan),
            chan,
            nick,
            args,
            next: 0,
            batch: ModeBatch::new(),
        };

        let mut dir = Direction::Add;
        for c in modes.chars() {
            match c {
                '+' => dir = Direction::Add,
                '-' => dir = Direction::Del,
                '=' => dir = Direction::Query,
                _ => self.dispatch(&mut ctx, dir, c),
            }
        }

        let ModeCtx { mut batch, .. } = ctx;
        if !batch.is_empty() {
            self.announce_modes(from, source, local, chan, &batch);
        }
        if local && let Source::Client(id) = source {
            for reply in std::mem::take(&mut batch.replies) {
                self.send_to_client(*id, &reply);
            }
        }
        batch
    }

    fn announce_modes(
        &mut self,
        from: Option<LinkId>,
        source: &Source,
        local: bool,
        chan: ChannelId,
        batch: &ModeBatch,
    ) {
        let Some(channel) = self.channel(chan) else {
            return;
        };
        let (name, ts, is_local_chan) = (channel.name.clone(), channel.ts, channel.is_local());
        let (prefix, source_id) = match source {
            Source::Client(id) => match self.client(*id) {
                Some(c) => (c.hostmask(), c.uid.clone()),
                None => return,
            },
            Source::Server(sid) => {
                let server = self
                    .topology
                    .get(sid)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| sid.clone());
                (server, sid.clone())
            }
        };

        let lines = render_local(&batch.changes, &prefix, &name);
        for line in &lines.all {
            self.send_to_channel_local(chan, Audience::AllMembers, None, line);
        }
        for line in &lines.chanops {
            self.send_to_channel_local(chan, Audience::ChanOps, None, line);
        }

        for change in &batch.changes {
            metrics::record_mode_change(change.letter);
        }
        debug!(channel = %name, source = %prefix, modes = %batch.summary(), "mode change");

        if is_local_chan || !(local || self.links.len() > 1) {
            return;
        }
        let b = self.broadcast(from);
        let combos: Vec<CapCombo> = self.combos.live().copied().collect();
        for combo in combos {
            let lines = render_remote(&batch.changes, combo.yes, combo.no, &source_id, ts, &name);
            if !lines.is_empty() {
                self.relay(&b, combo.yes, combo.no, &lines);
            }
        }
    }

    fn dispatch(&mut self, ctx: &mut ModeCtx<'_>, dir: Direction, c: char) {
        match self.modes.get(c) {
            ModeHandler::NoSuch => self.chm_nosuch(ctx, c),
            ModeHandler::Simple(flag) => self.chm_simple(ctx, dir, c, flag),
            ModeHandler::Service(flag) => self.chm_service(ctx, dir, c, flag),
            ModeHandler::Staff(flag, privs) => self.chm_staff(ctx, dir, c, flag, privs),
            ModeHandler::List(kind) => self.chm_list(ctx, dir, c, kind),
            ModeHandler::Op | ModeHandler::Voice => self.chm_status(ctx, dir, c),
            ModeHandler::Limit => self.chm_limit(ctx, dir, c),
            ModeHandler::Key => self.chm_key(ctx, dir, c),
            ModeHandler::Throttle => self.chm_throttle(ctx, dir, c),
            ModeHandler::Forward => self.chm_forward(ctx, dir, c),
        }
    }

    /// Queue a numeric for the invoker; dropped for remote sources.
    pub(crate) fn mode_reply(&self, ctx: &mut ModeCtx<'_>, code: u16, rest: &str) {
        if ctx.local {
            let line = numeric(self.name(), code, &ctx.nick, rest);
            ctx.batch.replies.push(line);
        }
    }

    /// Mode lock and chanop checks shared by most handlers.
    pub(crate) fn allow_change(&self, ctx: &mut ModeCtx<'_>, c: char) -> bool {
        let alevel = ctx.alevel;
        self.allow_change_at(ctx, c, alevel)
    }

    pub(crate) fn allow_change_at(&self, ctx: &mut ModeCtx<'_>, c: char, alevel: AccessLevel) -> bool {
        let Some(channel) = self.channel(ctx.chan) else {
            return false;
        };
        if ctx.local && channel.lock.locks(c) {
            if ctx.batch.first_report(ModeErrors::MLOCK) {
                let rest = format!(
                    "{} {c} {} :MODE cannot be set due to channel having an active MLOCK restriction policy",
                    channel.name, channel.lock.raw
                );
                self.mode_reply(ctx, replies::ERR_MLOCKRESTRICTED, &rest);
            }
            return false;
        }
        self.require_access(ctx, alevel, AccessLevel::Chanop)
    }

    /// Report 442 or 482 (once each) when `alevel` falls short of `needed`.
    pub(crate) fn require_access(&self, ctx: &mut ModeCtx<'_>, alevel: AccessLevel, needed: AccessLevel) -> bool {
        if alevel >= needed {
            return true;
        }
        let name = self
            .channel(ctx.chan)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        if alevel == AccessLevel::None {
            if ctx.batch.first_report(ModeErrors::NOTONCHANNEL) {
                self.mode_reply(ctx, replies::ERR_NOTONCHANNEL, &format!("{name} :You're not on that channel"));
            }
        } else if ctx.batch.first_report(ModeErrors::NOOPS) {
            self.mode_reply(ctx, replies::ERR_CHANOPRIVSNEEDED, &format!("{name} :You're not channel operator"));
        }
        false
    }
}
