//! PRIVMSG and NOTICE arriving from peers.

use meshirc_proto::Line;

use super::super::{ServerContext, ServerHandler};
use super::{display_prefix, need, source_client};
use crate::error::LinkError;
use crate::state::Network;

/// `:<source> PRIVMSG|NOTICE <target> :<text>` where the target is a
/// channel, `@#channel`, a UID or a nick.
pub struct MessageHandler;

impl ServerHandler for MessageHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 2)?;
        let command = line.command.to_ascii_uppercase();
        let (target, text) = (line.params[0], line.params[1]);
        let source = source_client(net, &ctx.source);

        let (ops_only, chan_name) = match target.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, target),
        };
        if chan_name.starts_with(['#', '&']) {
            let (Some(chan), Some(source)) = (net.find_channel(chan_name), source) else {
                return Ok(());
            };
            net.relay_channel_message(source, Some(ctx.link), &command, chan, ops_only, text);
            return Ok(());
        }

        let Some(to) = net.find_client(target) else {
            return Ok(());
        };
        let Some((local, nick, uid, via)) = net
            .client(to)
            .map(|c| (c.is_local(), c.nick.clone(), c.uid.clone(), c.link()))
        else {
            return Ok(());
        };
        if via == Some(ctx.link) {
            return Ok(());
        }
        match source {
            Some(from) => net.relay_private_message(from, &command, to, text),
            None if local => {
                let prefix = display_prefix(net, &ctx.source);
                net.send_to_client(to, &format!(":{prefix} {command} {nick} :{text}"));
            }
            None => {
                net.send_to_client(to, &format!(":{} {command} {uid} :{text}", ctx.source));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::client::testing::Harness;
    use crate::propagate::Caps;

    #[test]
    fn remote_messages_reach_channels_and_clients() {
        let mut h = Harness::new();
        let a = h.link("leaf.mesh", "1LF", Caps::empty());
        let b = h.link("other.mesh", "2OT", Caps::empty());
        h.from_link(a, ":1LF UID carol 1 10 + c c.example 0 1LFAAAAAB :Carol");
        h.from_link(b, ":2OT UID dave 1 10 + d d.example 0 2OTAAAAAB :Dave");
        let (_, alice) = h.connect("alice");
        h.send(alice, "JOIN #mesh");
        h.from_link(a, ":1LFAAAAAB JOIN 1000000 #mesh +");
        h.from_link(b, ":2OTAAAAAB JOIN 1000000 #mesh +");
        h.drain(alice);
        h.drain_link(a);
        h.drain_link(b);

        h.from_link(a, ":1LFAAAAAB PRIVMSG #mesh :hi all");
        assert_eq!(h.drain(alice), vec![":carol!c@c.example PRIVMSG #mesh :hi all"]);
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB PRIVMSG #mesh :hi all"]);
        assert!(h.drain_link(a).is_empty());

        h.from_link(a, ":1LFAAAAAB PRIVMSG 0HBAAAAAC :psst");
        assert_eq!(h.drain(alice), vec![":carol!c@c.example PRIVMSG alice :psst"]);

        h.from_link(a, ":1LFAAAAAB NOTICE 2OTAAAAAB :passing through");
        assert_eq!(h.drain_link(b), vec![":1LFAAAAAB NOTICE 2OTAAAAAB :passing through"]);

        h.from_link(a, ":1LF NOTICE alice :server notice");
        assert_eq!(h.drain(alice), vec![":leaf.mesh NOTICE alice :server notice"]);
    }
}
