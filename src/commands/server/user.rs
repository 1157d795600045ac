//! Remote clients: UID, NICK, QUIT, KILL and user MODE.

use meshirc_proto::Line;
use tracing::{debug, info};

use super::super::{ServerContext, ServerHandler};
use super::{display_prefix, need, parse_ts, source_client};
use crate::error::LinkError;
use crate::propagate::{Caps, LinkId};
use crate::state::{ClientId, ClientInfo, Network, OperPrivs, Origin, UserModes};

/// Which side of a nick collision survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collision {
    /// The incoming client is older; the existing one goes.
    KillExisting,
    /// The existing client is older; the incoming one goes.
    KillIncoming,
    /// Same timestamp: neither can be trusted with the nick.
    KillBoth,
}

fn resolve_collision(existing_ts: i64, incoming_ts: i64) -> Collision {
    match incoming_ts.cmp(&existing_ts) {
        std::cmp::Ordering::Less => Collision::KillExisting,
        std::cmp::Ordering::Greater => Collision::KillIncoming,
        std::cmp::Ordering::Equal => Collision::KillBoth,
    }
}

impl Network {
    /// Remove a client on the authority of `killer`, telling it if local
    /// and every link except `from` as `KILL`.
    pub(crate) fn kill_client(&mut self, id: ClientId, killer: &str, reason: &str, from: Option<LinkId>) {
        let Some((uid, nick, local)) = self.client(id).map(|c| (c.uid.clone(), c.nick.clone(), c.is_local())) else {
            return;
        };
        let prefix = display_prefix(self, killer);
        if local {
            self.send_to_client(id, &format!(":{prefix} KILL {nick} :{reason}"));
        }
        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{killer} KILL {uid} :{reason}")]);
        let killer_name = prefix.split('!').next().unwrap_or_default().to_string();
        self.remove_quitting(id, &format!("Killed ({killer_name} ({reason}))"));
        info!(%nick, %uid, killer = %killer_name, %reason, "client killed");
    }

    /// Kill an id we never accepted: only the link that sent it hears.
    fn reject_incoming(&mut self, link: LinkId, uid: &str) {
        let line = format!(":{} KILL {uid} :{} (Nick collision (new))", self.sid(), self.name());
        self.send_to_link(link, &line);
    }
}

/// `:<sid> UID <nick> <hops> <ts> <umodes> <user> <host> <ip> <uid> :<gecos>`
pub struct UidHandler;

impl ServerHandler for UidHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 9)?;
        let p = &line.params;
        let (nick, ts, uid) = (p[0], parse_ts(line, p[2])?, p[7]);
        if net.find_uid(uid).is_some() {
            return Err(LinkError::Protocol(format!("UID collision on {uid}")));
        }

        if let Some(existing) = net.find_nick(nick) {
            let existing_ts = net.client(existing).map_or(0, |c| c.ts);
            let me = net.sid().to_string();
            match resolve_collision(existing_ts, ts) {
                Collision::KillExisting => net.kill_client(existing, &me, "Nick collision (old)", None),
                Collision::KillIncoming => {
                    net.reject_incoming(ctx.link, uid);
                    return Ok(());
                }
                Collision::KillBoth => {
                    net.kill_client(existing, &me, "Nick collision", None);
                    net.reject_incoming(ctx.link, uid);
                    return Ok(());
                }
            }
        }

        let server = net
            .topology
            .get(uid.get(..3).unwrap_or(uid))
            .map_or_else(|| ctx.source.clone(), |s| s.name.clone());
        let info = ClientInfo {
            nick: nick.to_string(),
            user: p[4].to_string(),
            host: p[5].to_string(),
            ip: if p[6] == "0" { String::new() } else { p[6].to_string() },
            realname: p[8].to_string(),
            server,
            ts,
            umodes: UserModes::from_letters(p[3]),
            ..Default::default()
        };
        let id = net.add_client(uid.to_string(), info, Origin::Remote(ctx.link));
        debug!(%nick, %uid, "remote client introduced");
        net.introduce_client(id, Some(ctx.link));
        Ok(())
    }
}

/// `:<uid> NICK <newnick> :<ts>`
pub struct NickHandler;

impl ServerHandler for NickHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 2)?;
        let (nick, ts) = (line.params[0], parse_ts(line, line.params[1])?);
        let Some(id) = source_client(net, &ctx.source) else {
            return Ok(());
        };
        if let Some(existing) = net.find_nick(nick)
            && existing != id
        {
            let existing_ts = net.client(existing).map_or(0, |c| c.ts);
            let me = net.sid().to_string();
            match resolve_collision(existing_ts, ts) {
                Collision::KillExisting => net.kill_client(existing, &me, "Nick collision (old)", None),
                Collision::KillIncoming => {
                    net.kill_client(id, &me, "Nick collision (new)", None);
                    return Ok(());
                }
                Collision::KillBoth => {
                    net.kill_client(existing, &me, "Nick collision", None);
                    net.kill_client(id, &me, "Nick collision", None);
                    return Ok(());
                }
            }
        }
        net.rename_client(id, nick, ts, Some(ctx.link));
        Ok(())
    }
}

/// `:<uid> QUIT :<reason>`
pub struct QuitHandler;

impl ServerHandler for QuitHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        if let Some(id) = source_client(net, &ctx.source) {
            let reason = line.param(0).unwrap_or_default();
            net.exit_client(id, reason, Some(ctx.link));
        }
        Ok(())
    }
}

/// `:<source> KILL <uid> :<reason>`
pub struct KillHandler;

impl ServerHandler for KillHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 1)?;
        let Some(target) = net.find_client(line.params[0]) else {
            return Ok(());
        };
        let reason = line.param(1).unwrap_or("<No reason given>");
        net.kill_client(target, &ctx.source, reason, Some(ctx.link));
        Ok(())
    }
}

/// `:<uid> MODE <uid> :<umodes>`
pub struct UmodeHandler;

impl ServerHandler for UmodeHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 2)?;
        let Some(id) = source_client(net, &ctx.source) else {
            return Ok(());
        };
        if net.find_client(line.params[0]) != Some(id) {
            return Ok(());
        }
        let changes = line.params[1];
        let Some(c) = net.client_mut(id) else {
            return Ok(());
        };
        let mut adding = true;
        for ch in changes.chars() {
            match ch {
                '+' => adding = true,
                '-' => adding = false,
                _ => c.umodes.set(UserModes::from_letters(&ch.to_string()), adding),
            }
        }
        if !c.umodes.contains(UserModes::OPER) {
            c.privs = OperPrivs::empty();
        }
        let uid = c.uid.clone();
        let b = net.broadcast(Some(ctx.link));
        net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} MODE {uid} :{changes}")]);
        Ok(())
    }
}
