//! JOIN, PART and KICK from local clients.

use meshirc_proto::Line;
use tracing::debug;

use super::super::ClientHandler;
use super::{identity, send_error, targets};
use crate::error::{CommandError, CommandResult};
use crate::modes::{AccessLevel, Source};
use crate::propagate::{Audience, Caps};
use crate::replies::{self, numeric};
use crate::state::{ChannelId, ChannelModes, ClientId, MemberFlags, Network, is_channel_name};

/// Modes a freshly created channel starts with.
const CREATION_MODES: ChannelModes = ChannelModes::NOPRIVMSGS.union(ChannelModes::TOPICLIMIT);

impl Network {
    /// Topic and NAMES for a client that just joined.
    fn send_join_replies(&mut self, client: ClientId, chan: ChannelId) {
        let Some(ch) = self.channel(chan) else {
            return;
        };
        let me = self.name().to_string();
        let nick = self.client(client).map(|c| c.nick.clone()).unwrap_or_default();
        let mut lines = Vec::new();
        if let Some(topic) = &ch.topic {
            lines.push(numeric(&me, replies::RPL_TOPIC, &nick, &format!("{} :{}", ch.name, topic.text)));
        }

        let symbol = if ch.modes.contains(ChannelModes::SECRET) {
            '@'
        } else if ch.modes.contains(ChannelModes::PRIVATE) {
            '*'
        } else {
            '='
        };
        let mut names: Vec<(ClientId, String)> = ch
            .members
            .iter()
            .filter_map(|(id, handle)| {
                let c = self.client(*id)?;
                let m = self.membership(*handle)?;
                Some((*id, format!("{}{}", m.flags.prefixes(), c.nick)))
            })
            .collect();
        names.sort();
        let head = format!("{symbol} {} :", ch.name);
        let mut current = String::new();
        for (_, name) in names {
            // Leave room for the server prefix, numeric and target.
            if !current.is_empty() && head.len() + current.len() + name.len() + me.len() + nick.len() + 10 > 510 {
                lines.push(numeric(&me, replies::RPL_NAMREPLY, &nick, &format!("{head}{current}")));
                current.clear();
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&name);
        }
        if !current.is_empty() {
            lines.push(numeric(&me, replies::RPL_NAMREPLY, &nick, &format!("{head}{current}")));
        }
        lines.push(numeric(
            &me,
            replies::RPL_ENDOFNAMES,
            &nick,
            &format!("{} :End of /NAMES list.", ch.name),
        ));
        for line in &lines {
            self.send_to_client(client, line);
        }
    }

    /// Follow a channel's `+f` target after a forwardable refusal. Returns
    /// the target if the client may be sent there.
    fn forward_target(&self, client: ClientId, chan: ChannelId, key: Option<&str>) -> Option<ChannelId> {
        if !self.config.channel.use_forward {
            return None;
        }
        let name = self.channel(chan)?.params.forward.as_deref()?;
        let target = self.find_channel(name)?;
        if target == chan || self.is_member(target, client) {
            return None;
        }
        if self.channel(target)?.modes.contains(ChannelModes::DISFORWARD) {
            return None;
        }
        self.can_join(client, target, key).ok().map(|()| target)
    }

    /// Join one channel by name for a local client: create it or pass the
    /// admission checks, then tell the channel and the network.
    pub(crate) fn join_local(&mut self, client: ClientId, name: &str, key: Option<&str>) -> CommandResult {
        if !name.starts_with(['#', '&']) {
            return Err(CommandError::NoSuchChannel(name.to_string()));
        }
        if !is_channel_name(name) {
            let nick = self.client(client).map(|c| c.nick.clone()).unwrap_or_default();
            let line = numeric(self.name(), replies::ERR_BADCHANNAME, &nick, &format!("{name} :Illegal channel name"));
            self.send_to_client(client, &line);
            return Ok(());
        }

        let Some(chan) = self.find_channel(name) else {
            let now = self.now();
            let (chan, _) = self.get_or_create_channel(name, now);
            if let Some(ch) = self.channel_mut(chan) {
                ch.modes |= CREATION_MODES;
            }
            self.finish_join(client, chan, MemberFlags::CHANOP, true);
            return Ok(());
        };
        if self.is_member(chan, client) {
            return Ok(());
        }

        let chan = match self.can_join(client, chan, key) {
            Ok(()) => chan,
            Err(reason) => {
                let target = if reason.forwardable() {
                    self.forward_target(client, chan, key)
                } else {
                    None
                };
                let Some(target) = target else {
                    let channel = self.channel(chan).map_or_else(|| name.to_string(), |c| c.name.clone());
                    return Err(CommandError::CannotJoin { channel, reason });
                };
                self.announce_forward(client, chan, target);
                target
            }
        };
        self.finish_join(client, chan, MemberFlags::empty(), false);
        Ok(())
    }

    fn announce_forward(&mut self, client: ClientId, from: ChannelId, to: ChannelId) {
        let (Some(a), Some(b)) = (self.channel(from), self.channel(to)) else {
            return;
        };
        let rest = format!("{} {} :Forwarding to another channel", a.name, b.name);
        let nick = self.client(client).map(|c| c.nick.clone()).unwrap_or_default();
        let line = numeric(self.name(), replies::ERR_LINKCHANNEL, &nick, &rest);
        self.send_to_client(client, &line);
    }

    fn finish_join(&mut self, client: ClientId, chan: ChannelId, flags: MemberFlags, created: bool) {
        if self.add_member(chan, client, flags).is_none() {
            return;
        }
        let Some((mask, uid)) = self.client(client).map(|c| (c.hostmask(), c.uid.clone())) else {
            return;
        };
        let Some((name, ts, local_chan)) = self.channel(chan).map(|c| (c.name.clone(), c.ts, c.is_local())) else {
            return;
        };

        self.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} JOIN {name}"));
        if created {
            let me = self.name().to_string();
            self.send_to_channel_local(chan, Audience::ChanOps, None, &format!(":{me} MODE {name} +nt"));
        }
        self.send_join_replies(client, chan);
        let now = self.now();
        if let Some(ch) = self.channel_mut(chan) {
            ch.record_join(now);
        }
        debug!(channel = %name, %uid, created, "local join");

        if local_chan {
            return;
        }
        let line = if created {
            format!(":{} SJOIN {ts} {name} +nt :@{uid}", self.sid())
        } else {
            format!(":{uid} JOIN {ts} {name} +")
        };
        let b = self.broadcast(None);
        self.relay(&b, Caps::TS6, Caps::empty(), &[line]);
    }

    /// `JOIN 0`: leave every channel.
    fn part_all(&mut self, client: ClientId) {
        let Some((mask, uid, chans)) = self
            .client(client)
            .map(|c| (c.hostmask(), c.uid.clone(), c.channels.keys().copied().collect::<Vec<_>>()))
        else {
            return;
        };
        for chan in chans {
            if let Some(name) = self.channel(chan).map(|c| c.name.clone()) {
                self.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} PART {name}"));
            }
            self.remove_member(chan, client);
        }
        let b = self.broadcast(None);
        self.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} JOIN 0")]);
    }
}

/// `JOIN <chan>{,<chan>} [<key>{,<key>}]`
pub struct JoinHandler;

impl ClientHandler for JoinHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let chans = line.param(0).ok_or(CommandError::NeedMoreParams)?;
        if chans == "0" {
            net.part_all(client);
            return Ok(());
        }
        let mut keys = line.param(1).unwrap_or_default().split(',');
        for name in targets(chans) {
            let key = keys.next().filter(|k| !k.is_empty());
            if let Err(e) = net.join_local(client, name, key) {
                send_error(net, client, "JOIN", e);
            }
        }
        Ok(())
    }
}

/// `PART <chan>{,<chan>} [:<reason>]`
pub struct PartHandler;

impl ClientHandler for PartHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let chans = line.param(0).ok_or(CommandError::NeedMoreParams)?;
        let reason = line.param(1).filter(|r| !r.is_empty());
        let Some((_, mask)) = identity(net, client) else {
            return Ok(());
        };
        let uid = net.client(client).map(|c| c.uid.clone()).unwrap_or_default();

        for name in targets(chans) {
            let Some(chan) = net.find_channel(name) else {
                send_error(net, client, "PART", CommandError::NoSuchChannel(name.to_string()));
                continue;
            };
            if !net.is_member(chan, client) {
                send_error(net, client, "PART", CommandError::NotOnChannel(name.to_string()));
                continue;
            }
            // A reason is only shown if the client could have said it.
            let reason = reason.filter(|_| net.can_send(client, chan));
            let Some((name, local_chan)) = net.channel(chan).map(|c| (c.name.clone(), c.is_local())) else {
                continue;
            };
            let suffix = reason.map(|r| format!(" :{r}")).unwrap_or_default();
            net.send_to_channel_local(chan, Audience::AllMembers, None, &format!(":{mask} PART {name}{suffix}"));
            if !local_chan {
                let b = net.broadcast(None);
                net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} PART {name}{suffix}")]);
            }
            net.remove_member(chan, client);
        }
        Ok(())
    }
}

/// `KICK <chan> <nick>{,<nick>} [:<reason>]`
pub struct KickHandler;

impl ClientHandler for KickHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let (Some(name), Some(victims)) = (line.param(0), line.param(1)) else {
            return Err(CommandError::NeedMoreParams);
        };
        let chan = net
            .find_channel(name)
            .ok_or_else(|| CommandError::NoSuchChannel(name.to_string()))?;
        match net.channel_access(&Source::Client(client), chan) {
            AccessLevel::None => return Err(CommandError::NotOnChannel(name.to_string())),
            AccessLevel::Peon => return Err(CommandError::ChanOpPrivsNeeded(name.to_string())),
            AccessLevel::Chanop => {}
        }
        let Some((nick, mask)) = identity(net, client) else {
            return Ok(());
        };
        let uid = net.client(client).map(|c| c.uid.clone()).unwrap_or_default();
        let reason = line.param(2).filter(|r| !r.is_empty()).unwrap_or(nick.as_str()).to_string();

        for victim in targets(victims) {
            let Some(target) = net.chase_nick(victim) else {
                send_error(net, client, "KICK", CommandError::NoSuchNick(victim.to_string()));
                continue;
            };
            let Some((chan_name, local_chan)) = net.channel(chan).map(|c| (c.name.clone(), c.is_local())) else {
                break;
            };
            let Some((target_nick, target_uid)) = net.client(target).map(|c| (c.nick.clone(), c.uid.clone())) else {
                continue;
            };
            if !net.is_member(chan, target) {
                send_error(
                    net,
                    client,
                    "KICK",
                    CommandError::UserNotInChannel(target_nick, chan_name),
                );
                continue;
            }
            if let Err(notice) = net.run_kick_hooks(client, target, chan) {
                let me = net.name().to_string();
                net.send_to_client(client, &format!(":{me} NOTICE {nick} :{notice}"));
                continue;
            }

            net.send_to_channel_local(
                chan,
                Audience::AllMembers,
                None,
                &format!(":{mask} KICK {chan_name} {target_nick} :{reason}"),
            );
            if !local_chan {
                let b = net.broadcast(None);
                net.relay(
                    &b,
                    Caps::TS6,
                    Caps::empty(),
                    &[format!(":{uid} KICK {chan_name} {target_uid} :{reason}")],
                );
            }
            net.remove_member(chan, target);
        }
        Ok(())
    }
}
