//! MODE and MLOCK from local clients.

use meshirc_proto::{Line, irc_eq};

use super::super::ClientHandler;
use crate::error::{CommandError, CommandResult};
use crate::modes::Source;
use crate::propagate::Caps;
use crate::replies::{self, numeric};
use crate::state::{ClientId, Network, OperPrivs, UserModes};

/// `MODE <target> [<modes> [<args>...]]`
pub struct ModeHandler;

impl ClientHandler for ModeHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let target = line.param(0).ok_or(CommandError::NeedMoreParams)?;
        if target.starts_with(['#', '&']) {
            channel_mode(net, client, target, line)
        } else {
            user_mode(net, client, target, line.param(1))
        }
    }
}

fn channel_mode(net: &mut Network, client: ClientId, name: &str, line: &Line<'_>) -> CommandResult {
    let chan = net
        .find_channel(name)
        .ok_or_else(|| CommandError::NoSuchChannel(name.to_string()))?;
    let Some(modes) = line.param(1) else {
        let Some(ch) = net.channel(chan) else {
            return Ok(());
        };
        let member = net.is_member(chan, client);
        let nick = net.client(client).map(|c| c.nick.clone()).unwrap_or_default();
        let me = net.name();
        let lines = [
            numeric(
                me,
                replies::RPL_CHANNELMODEIS,
                &nick,
                &format!("{} {}", ch.name, ch.mode_string(member)),
            ),
            numeric(me, replies::RPL_CREATIONTIME, &nick, &format!("{} {}", ch.name, ch.ts)),
        ];
        for l in &lines {
            net.send_to_client(client, l);
        }
        return Ok(());
    };
    let args: Vec<&str> = line.params.iter().skip(2).copied().collect();
    net.set_channel_mode(None, &Source::Client(client), chan, modes, &args);
    Ok(())
}

/// Own user modes: query, or toggle `i` and `w`. `+o` only comes from OPER.
fn user_mode(net: &mut Network, client: ClientId, target: &str, modes: Option<&str>) -> CommandResult {
    let Some(c) = net.client(client) else {
        return Ok(());
    };
    if !irc_eq(&c.nick, target) {
        return match net.find_nick(target) {
            Some(_) => Err(CommandError::UsersDontMatch),
            None => Err(CommandError::NoSuchNick(target.to_string())),
        };
    }
    let (nick, uid, before) = (c.nick.clone(), c.uid.clone(), c.umodes);
    let Some(modes) = modes else {
        let line = numeric(net.name(), replies::RPL_UMODEIS, &nick, &before.to_letters());
        net.send_to_client(client, &line);
        return Ok(());
    };

    let mut after = before;
    let mut adding = true;
    for ch in modes.chars() {
        match ch {
            '+' => adding = true,
            '-' => adding = false,
            'i' => after.set(UserModes::INVISIBLE, adding),
            'w' => after.set(UserModes::WALLOPS, adding),
            'o' if !adding => after.remove(UserModes::OPER),
            _ => {}
        }
    }
    if after == before {
        return Ok(());
    }
    if let Some(c) = net.client_mut(client) {
        c.umodes = after;
        if !after.contains(UserModes::OPER) {
            c.privs = OperPrivs::empty();
        }
    }

    let change = umode_delta(before, after);
    net.send_to_client(client, &format!(":{nick} MODE {nick} :{change}"));
    let b = net.broadcast(None);
    net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} MODE {uid} :{change}")]);
    Ok(())
}

/// `+added-removed` between two user mode sets.
pub(crate) fn umode_delta(before: UserModes, after: UserModes) -> String {
    let mut out = String::new();
    let added = after.difference(before);
    let removed = before.difference(after);
    if !added.is_empty() {
        out.push_str(&added.to_letters());
    }
    if !removed.is_empty() {
        out.push('-');
        out.push_str(&removed.to_letters()[1..]);
    }
    out
}

/// `MLOCK <channel> :<modes>`: set a server-enforced lock. Admins only.
pub struct MlockHandler;

impl ClientHandler for MlockHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let (Some(name), Some(raw)) = (line.param(0), line.param(1)) else {
            return Err(CommandError::NeedMoreParams);
        };
        let Some((nick, privs)) = net.client(client).map(|c| (c.nick.clone(), c.privs)) else {
            return Ok(());
        };
        if !privs.contains(OperPrivs::ADMIN) {
            return Err(CommandError::NoPrivileges);
        }
        let chan = net
            .find_channel(name)
            .ok_or_else(|| CommandError::NoSuchChannel(name.to_string()))?;
        let sid = net.sid().to_string();
        net.set_mode_lock(None, &sid, chan, raw);

        let lock = net.channel(chan).map(|c| (c.name.clone(), c.lock.clone()));
        if let Some((chan_name, lock)) = lock {
            let me = net.name().to_string();
            let text = if lock.is_empty() {
                format!("{chan_name} is no longer mode locked")
            } else {
                format!("{chan_name} mode lock is now {}", lock.raw)
            };
            net.send_to_client(client, &format!(":{me} NOTICE {nick} :{text}"));
        }
        Ok(())
    }
}
