//! TMODE, MLOCK and BMASK from peers.
//!
//! Each carries the sender's channel timestamp. When ours is older the
//! channel was recreated on our side after the change was made, so the
//! change is dropped.

use meshirc_proto::Line;
use tracing::debug;

use super::super::{ServerContext, ServerHandler};
use super::{display_prefix, need, parse_ts, source_client};
use crate::error::LinkError;
use crate::modes::{Direction, ModeChange, Scope, Source};
use crate::propagate::{Caps, MODEBUFLEN};
use crate::state::{ChannelId, ListKind, Network};

/// Resolve `<ts> <chan>` and apply the timestamp rule.
fn current_channel(net: &Network, line: &Line<'_>) -> Result<Option<ChannelId>, LinkError> {
    let ts = parse_ts(line, line.params[0])?;
    let Some(chan) = net.find_channel(line.params[1]) else {
        return Ok(None);
    };
    let ours = net.channel(chan).map_or(0, |c| c.ts);
    if ts > ours {
        debug!(command = %line.command, channel = %line.params[1], ts, ours, "dropping change for newer channel");
        return Ok(None);
    }
    Ok(Some(chan))
}

/// `:<source> TMODE <ts> <chan> <letters> [<args>...]`
pub struct TmodeHandler;

impl ServerHandler for TmodeHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 3)?;
        let Some(chan) = current_channel(net, line)? else {
            return Ok(());
        };
        let source = match source_client(net, &ctx.source) {
            Some(id) => Source::Client(id),
            None => Source::Server(ctx.source.clone()),
        };
        net.set_channel_mode(Some(ctx.link), &source, chan, line.params[2], &line.params[3..]);
        Ok(())
    }
}

/// `:<source> MLOCK <ts> <chan> :<letters>`
pub struct MlockHandler;

impl ServerHandler for MlockHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 3)?;
        let Some(chan) = current_channel(net, line)? else {
            return Ok(());
        };
        net.set_mode_lock(Some(ctx.link), &ctx.source, chan, line.params[2]);
        Ok(())
    }
}

/// `:<sid> BMASK <ts> <chan> <letter> :<mask> [<mask>...]`
pub struct BmaskHandler;

impl ServerHandler for BmaskHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 4)?;
        let Some(chan) = current_channel(net, line)? else {
            return Ok(());
        };
        let mut letters = line.params[2].chars();
        let (Some(letter), None) = (letters.next(), letters.next()) else {
            return Ok(());
        };
        let Some(kind) = ListKind::from_letter(letter) else {
            return Ok(());
        };
        let (needed, scope) = match kind {
            ListKind::Ban | ListKind::Quiet => (Caps::empty(), Scope::AllMembers),
            ListKind::Except => (Caps::EX, Scope::ChanOps),
            ListKind::Invex => (Caps::IE, Scope::ChanOps),
        };

        let setter = display_prefix(net, &ctx.source);
        let now = net.now();
        let Some(ch) = net.channel_mut(chan) else {
            return Ok(());
        };
        let mut changes = Vec::new();
        for mask in line.params[3].split_whitespace() {
            if mask.starts_with(':') || mask.len() > MODEBUFLEN {
                continue;
            }
            if ch.list(kind).contains_exact(mask) {
                continue;
            }
            ch.list_mut(kind).push(mask.to_string(), setter.clone(), now);
            changes.push(ModeChange::new(letter, Direction::Add, Some(mask.to_string())).with_scope(scope));
        }
        if changes.is_empty() {
            return Ok(());
        }
        ch.list_changed();
        let (ts, name) = (ch.ts, ch.name.clone());
        net.send_mode_changes(chan, &changes, &setter);

        let relayed = format!(":{} BMASK {ts} {name} {letter} :{}", ctx.source, line.params[3]);
        let b = net.broadcast(Some(ctx.link));
        net.relay(&b, Caps::TS6 | needed, Caps::empty(), &[relayed]);
        Ok(())
    }
}
