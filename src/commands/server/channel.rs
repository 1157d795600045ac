//! JOIN, PART and KICK from peers.

use meshirc_proto::Line;
use tracing::debug;

use super::super::{ServerContext, ServerHandler};
use super::sjoin::ChannelState;
use super::{display_prefix, need, parse_ts, source_client};
use crate::error::LinkError;
use crate::propagate::{Audience, Caps};
use crate::state::{MemberFlags, Network, is_channel_name};

/// `:<uid> JOIN <ts> <chan> +`, or `:<uid> JOIN 0`.
pub struct JoinHandler;

impl ServerHandler for JoinHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        let Some(client) = source_client(net, &ctx.source) else {
            return Ok(());
        };
        let Some(mask) = net.client(client).map(|c| c.hostmask()) else {
            return Ok(());
        };

        if line.params.len() == 1 && line.params[0] == "0" {
            let chans: Vec<_> = net
                .client(client)
                .map(|c| c.channels.keys().copied().collect())
                .unwrap_or_default();
            for chan in chans {
                if let Some(name) = net.channel(chan).map(|c| c.name.clone()) {
                    net.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} PART {name}"));
                }
                net.remove_member(chan, client);
            }
            let b = net.broadcast(Some(ctx.link));
            net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{} JOIN 0", ctx.source)]);
            return Ok(());
        }

        need(line, 3)?;
        let ts = parse_ts(line, line.params[0])?;
        let name = line.params[1];
        if !is_channel_name(name) || name.starts_with('&') {
            return Ok(());
        }
        let Some(theirs) = ChannelState::parse(line.params[2], &line.params[3..]) else {
            return Ok(());
        };

        let (chan, created) = net.get_or_create_channel(name, ts);
        let server = net
            .client(client)
            .map(|c| c.server.clone())
            .unwrap_or_else(|| display_prefix(net, &ctx.source));
        net.reconcile_channel(chan, created, ts, &theirs, &server);

        let Some((chname, chts)) = net.channel(chan).map(|c| (c.name.clone(), c.ts)) else {
            return Ok(());
        };
        if !net.is_member(chan, client) {
            net.add_member(chan, client, MemberFlags::empty());
            net.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} JOIN {chname}"));
            debug!(channel = %chname, uid = %ctx.source, "remote join");
        }
        let b = net.broadcast(Some(ctx.link));
        net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{} JOIN {chts} {chname} +", ctx.source)]);
        Ok(())
    }
}

/// `:<uid> PART <chan>[,<chan>...] [:<reason>]`
pub struct PartHandler;

impl ServerHandler for PartHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 1)?;
        let Some(client) = source_client(net, &ctx.source) else {
            return Ok(());
        };
        let Some(mask) = net.client(client).map(|c| c.hostmask()) else {
            return Ok(());
        };
        let reason = line.param(1).filter(|r| !r.is_empty());

        for name in line.params[0].split(',').filter(|n| !n.is_empty()) {
            let Some(chan) = net.find_channel(name) else {
                continue;
            };
            if !net.is_member(chan, client) {
                continue;
            }
            let chname = net.channel(chan).map(|c| c.name.clone()).unwrap_or_default();
            let (local, remote) = match reason {
                Some(r) => (
                    format!(":{mask} PART {chname} :{r}"),
                    format!(":{} PART {chname} :{r}", ctx.source),
                ),
                None => (format!(":{mask} PART {chname}"), format!(":{} PART {chname}", ctx.source)),
            };
            net.send_to_channel_local(chan, Audience::AllMembers, None, &local);
            let b = net.broadcast(Some(ctx.link));
            net.relay(&b, Caps::TS6, Caps::empty(), &[remote]);
            net.remove_member(chan, client);
        }
        Ok(())
    }
}

/// `:<source> KICK <chan> <uid> :<reason>`
pub struct KickHandler;

impl ServerHandler for KickHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 2)?;
        let Some(chan) = net.find_channel(line.params[0]) else {
            return Ok(());
        };
        let Some(target) = net.find_client(line.params[1]) else {
            return Ok(());
        };
        if !net.is_member(chan, target) {
            return Ok(());
        }
        let Some((nick, uid)) = net.client(target).map(|c| (c.nick.clone(), c.uid.clone())) else {
            return Ok(());
        };
        let chname = net.channel(chan).map(|c| c.name.clone()).unwrap_or_default();
        let reason = line.param(2).filter(|r| !r.is_empty()).unwrap_or(nick.as_str());
        let prefix = display_prefix(net, &ctx.source);

        net.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{prefix} KICK {chname} {nick} :{reason}"));
        let b = net.broadcast(Some(ctx.link));
        let relayed = format!(":{} KICK {chname} {uid} :{reason}", ctx.source);
        net.relay(&b, Caps::TS6, Caps::empty(), &[relayed]);
        net.remove_member(chan, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::client::testing::Harness;
    use crate::propagate::{Caps, LinkId};
    use crate::state::MemberFlags;

    fn setup() -> (Harness, LinkId, LinkId) {
        let mut h = Harness::new();
        let a = h.link("leaf.mesh", "1LF", Caps::empty());
        let b = h.link("other.mesh", "2OT", Caps::empty());
        h.from_link(a, ":1LF UID carol 1 10 + c c.example 0 1LFAAAAAB :Carol");
        h.drain_link(b);
        (h, a, b)
    }

    #[test]
    fn remote_join_adds_member_without_status() {
        let (mut h, a, b) = setup();
        let (_, conn) = h.connect("alice");
        h.send(conn, "JOIN #mesh");
        h.drain(conn);
        h.drain_link(b);

        h.from_link(a, ":1LFAAAAAB JOIN 1000000 #mesh +");
        assert_eq!(h.drain(conn), vec![":carol!c@c.example JOIN #mesh"]);
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB JOIN 1000000 #mesh +"]);
        let chan = h.net.find_channel("#mesh").unwrap();
        let carol = h.net.find_nick("carol").unwrap();
        assert_eq!(h.net.member_flags(chan, carol), Some(MemberFlags::empty()));
    }

    #[test]
    fn older_remote_join_lowers_the_timestamp() {
        let (mut h, a, _) = setup();
        let (alice, conn) = h.connect("alice");
        h.send(conn, "JOIN #mesh");
        h.drain(conn);

        h.from_link(a, ":1LFAAAAAB JOIN 42 #mesh +");
        assert_eq!(
            h.drain(conn),
            vec![
                ":hub.mesh MODE #mesh -o alice".to_string(),
                ":hub.mesh NOTICE #mesh :*** Notice -- TS for #mesh changed from 1000000 to 42".to_string(),
                ":leaf.mesh MODE #mesh -nt".to_string(),
                ":carol!c@c.example JOIN #mesh".to_string(),
            ]
        );
        let chan = h.net.find_channel("#mesh").unwrap();
        assert_eq!(h.net.channel(chan).unwrap().ts, 42);
        assert_eq!(h.net.member_flags(chan, alice), Some(MemberFlags::empty()));
    }

    #[test]
    fn part_and_kick_are_shown_and_relayed() {
        let (mut h, a, b) = setup();
        let (alice, conn) = h.connect("alice");
        h.send(conn, "JOIN #mesh");
        h.from_link(a, ":1LFAAAAAB JOIN 1000000 #mesh +");
        h.drain(conn);
        h.drain_link(b);

        h.from_link(a, ":1LFAAAAAB PART #mesh :bye");
        assert_eq!(h.drain(conn), vec![":carol!c@c.example PART #mesh :bye"]);
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB PART #mesh :bye"]);

        h.from_link(a, ":1LFAAAAAB JOIN 1000000 #mesh +");
        h.drain(conn);
        h.drain_link(b);
        h.from_link(a, ":1LFAAAAAB KICK #mesh 0HBAAAAAC :out");
        assert_eq!(h.drain(conn), vec![":carol!c@c.example KICK #mesh alice :out"]);
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB KICK #mesh 0HBAAAAAC :out"]);
        let chan = h.net.find_channel("#mesh").unwrap();
        assert!(!h.net.is_member(chan, alice));
    }

    #[test]
    fn join_zero_parts_everything() {
        let (mut h, a, b) = setup();
        h.from_link(a, ":1LF SJOIN 10 #one + :1LFAAAAAB");
        h.from_link(a, ":1LF SJOIN 10 #two + :1LFAAAAAB");
        h.drain_link(b);
        h.from_link(a, ":1LFAAAAAB JOIN 0");
        assert!(h.net.find_channel("#one").is_none());
        assert!(h.net.find_channel("#two").is_none());
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB JOIN 0"]);
    }
}
