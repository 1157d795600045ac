//! PRIVMSG and NOTICE from local clients.

use meshirc_proto::Line;

use super::super::ClientHandler;
use super::{send_error, targets};
use crate::error::{CommandError, CommandResult};
use crate::propagate::{Audience, LinkId};
use crate::state::{ChannelId, ChannelModes, ClientId, Network};

impl Network {
    /// Deliver a channel message to local members other than the sender and
    /// to each link with members behind it, except `from`. With `ops_only`
    /// only chanops see it and peers get the `@#chan` form.
    pub(crate) fn relay_channel_message(
        &mut self,
        source: ClientId,
        from: Option<LinkId>,
        command: &str,
        chan: ChannelId,
        ops_only: bool,
        text: &str,
    ) {
        let (Some(c), Some(ch)) = (self.client(source), self.channel(chan)) else {
            return;
        };
        let (mask, uid, name) = (c.hostmask(), c.uid.clone(), ch.name.clone());
        let (audience, target) = if ops_only {
            (Audience::ChanOps, format!("@{name}"))
        } else {
            (Audience::AllMembers, name)
        };
        self.send_to_channel_local(chan, audience, Some(source), &format!(":{mask} {command} {target} :{text}"));
        let b = self.broadcast(from);
        self.flood_channel_remote(&b, chan, &format!(":{uid} {command} {target} :{text}"));
    }

    /// Deliver a private message to one client, local or remote.
    pub(crate) fn relay_private_message(&mut self, source: ClientId, command: &str, target: ClientId, text: &str) {
        let (Some(s), Some(t)) = (self.client(source), self.client(target)) else {
            return;
        };
        let line = if t.is_local() {
            format!(":{} {command} {} :{text}", s.hostmask(), t.nick)
        } else {
            format!(":{} {command} {} :{text}", s.uid, t.uid)
        };
        self.send_to_client(target, &line);
    }
}

fn message(net: &mut Network, client: ClientId, command: &str, line: &Line<'_>) -> CommandResult {
    let notice = command == "NOTICE";
    let list = line
        .param(0)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CommandError::NoRecipient(command.to_string()))?;
    let text = line
        .param(1)
        .filter(|t| !t.is_empty())
        .ok_or(CommandError::NoTextToSend)?;

    for target in targets(list) {
        if target.starts_with(['#', '&']) {
            let Some(chan) = net.find_channel(target) else {
                if !notice {
                    send_error(net, client, command, CommandError::NoSuchNick(target.to_string()));
                }
                continue;
            };
            if net.can_send(client, chan) {
                net.relay_channel_message(client, None, command, chan, false, text);
            } else if net.channel(chan).is_some_and(|c| c.modes.contains(ChannelModes::OPMODERATE)) {
                net.relay_channel_message(client, None, command, chan, true, text);
            } else if !notice {
                let name = net.channel(chan).map(|c| c.name.clone()).unwrap_or_default();
                send_error(net, client, command, CommandError::CannotSendToChan(name));
            }
            continue;
        }
        match net.find_nick(target) {
            Some(to) => net.relay_private_message(client, command, to, text),
            None if !notice => send_error(net, client, command, CommandError::NoSuchNick(target.to_string())),
            None => {}
        }
    }
    Ok(())
}

pub struct PrivmsgHandler;

impl ClientHandler for PrivmsgHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        message(net, client, "PRIVMSG", line)
    }
}

pub struct NoticeHandler;

impl ClientHandler for NoticeHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        message(net, client, "NOTICE", line)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use crate::propagate::Caps;

    #[test]
    fn channel_message_skips_sender_and_floods_once_per_link() {
        let mut h = Harness::new();
        let link = h.link("leaf.mesh", "1LF", Caps::empty());
        let (_, alice) = h.connect("alice");
        let (_, bob) = h.connect("bob");
        h.send(alice, "JOIN #mesh");
        h.send(bob, "JOIN #mesh");
        h.from_link(link, ":1LF UID carol 1 10 + c c.example 0 1LFAAAAAB :Carol");
        h.from_link(link, ":1LF UID dave 1 10 + d d.example 0 1LFAAAAAC :Dave");
        h.from_link(link, ":1LFAAAAAB JOIN 1000000 #mesh +");
        h.from_link(link, ":1LFAAAAAC JOIN 1000000 #mesh +");
        h.drain(alice);
        h.drain(bob);
        h.drain_link(link);

        h.send(alice, "PRIVMSG #mesh :hello");
        assert!(h.drain(alice).is_empty());
        assert_eq!(h.drain(bob), vec![":alice!alice@host.example PRIVMSG #mesh :hello"]);
        assert_eq!(h.drain_link(link), vec![":0HBAAAAAC PRIVMSG #mesh :hello"]);
    }

    #[test]
    fn moderation_and_opmoderate() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        let (_, bob) = h.connect("bob");
        h.send(alice, "JOIN #mesh");
        h.send(bob, "JOIN #mesh");
        h.send(alice, "MODE #mesh +m");
        h.drain(alice);
        h.drain(bob);

        h.send(bob, "PRIVMSG #mesh :hi");
        assert_eq!(h.drain(bob), vec![":hub.mesh 404 bob #mesh :Cannot send to channel"]);
        h.send(bob, "NOTICE #mesh :hi");
        assert!(h.drain(bob).is_empty());

        h.send(alice, "MODE #mesh +z");
        h.drain(alice);
        h.send(bob, "PRIVMSG #mesh :psst");
        assert_eq!(h.drain(alice), vec![":bob!bob@host.example PRIVMSG @#mesh :psst"]);
    }

    #[test]
    fn outsiders_blocked_by_no_external() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        let (_, bob) = h.connect("bob");
        h.send(alice, "JOIN #mesh");
        h.drain(alice);
        h.send(bob, "PRIVMSG #mesh :knock knock");
        assert!(h.drain(bob)[0].contains(" 404 "));
        assert!(h.drain(alice).is_empty());
    }

    #[test]
    fn private_messages_and_errors() {
        let mut h = Harness::new();
        let link = h.link("leaf.mesh", "1LF", Caps::empty());
        let (_, alice) = h.connect("alice");
        let (_, bob) = h.connect("bob");
        h.from_link(link, ":1LF UID carol 1 10 + c c.example 0 1LFAAAAAB :Carol");
        h.drain_link(link);

        h.send(alice, "PRIVMSG bob,carol :hey");
        assert_eq!(h.drain(bob), vec![":alice!alice@host.example PRIVMSG bob :hey"]);
        assert_eq!(h.drain_link(link), vec![":0HBAAAAAC PRIVMSG 1LFAAAAAB :hey"]);

        h.send(alice, "PRIVMSG nobody :hey");
        h.send(alice, "PRIVMSG");
        h.send(alice, "PRIVMSG bob");
        h.send(alice, "NOTICE nobody :hey");
        assert_eq!(
            h.drain(alice),
            vec![
                ":hub.mesh 401 alice nobody :No such nick/channel".to_string(),
                ":hub.mesh 411 alice :No recipient given (PRIVMSG)".to_string(),
                ":hub.mesh 412 alice :No text to send".to_string(),
            ]
        );
    }
}
