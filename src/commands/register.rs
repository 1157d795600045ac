//! Connection registration: clients (NICK/USER) and servers
//! (PASS/CAPAB/SERVER).

use meshirc_proto::Line;
use tracing::{info, warn};

use crate::config::LinkBlock;
use crate::error::{CommandError, LinkError};
use crate::propagate::{Caps, ServerInfo};
use crate::replies::{self, numeric};
use crate::state::{
    ClientInfo, ConnId, MAX_NICK_LEN, Network, Origin, Registration, Role, is_valid_nick,
};

const USERLEN: usize = 10;

pub(super) fn handle(net: &mut Network, conn: ConnId, command: &str, line: &Line<'_>) {
    let result = match command {
        "NICK" => nick(net, conn, line),
        "USER" => user(net, conn, line),
        "PASS" => pass(net, conn, line),
        "CAPAB" => capab(net, conn, line),
        "SERVER" => {
            if let Err(e) = accept_server(net, conn, line) {
                warn!(%conn, error = %e, code = e.error_code(), "refusing link");
                net.send_to_conn(conn, &e.to_error_line());
                net.drop_conn(conn);
            }
            return;
        }
        "PING" => {
            let token = line.param(0).unwrap_or_default();
            let me = net.name().to_string();
            net.send_to_conn(conn, &format!(":{me} PONG {me} :{token}"));
            Ok(())
        }
        "PONG" => Ok(()),
        "QUIT" => {
            net.send_to_conn(conn, "ERROR :Closing Link: (Client Quit)");
            net.drop_conn(conn);
            return;
        }
        "ERROR" => {
            warn!(%conn, message = line.param(0).unwrap_or_default(), "ERROR before registration");
            net.drop_conn(conn);
            return;
        }
        _ => Err(CommandError::NotRegistered),
    };

    if let Err(e) = result {
        let nick = registration(net, conn)
            .and_then(|r| r.nick.clone())
            .unwrap_or_default();
        if let Some(reply) = e.to_reply(net.name(), &nick, command) {
            net.send_to_conn(conn, &reply);
        }
        return;
    }
    try_register_client(net, conn);
}

fn registration(net: &Network, conn: ConnId) -> Option<&Registration> {
    match &net.conns.get(&conn)?.role {
        Role::Unregistered(reg) => Some(reg),
        _ => None,
    }
}

fn registration_mut(net: &mut Network, conn: ConnId) -> Option<&mut Registration> {
    match &mut net.conns.get_mut(&conn)?.role {
        Role::Unregistered(reg) => Some(reg),
        _ => None,
    }
}

fn nick(net: &mut Network, conn: ConnId, line: &Line<'_>) -> Result<(), CommandError> {
    let nick = line
        .param(0)
        .filter(|n| !n.is_empty())
        .ok_or(CommandError::NoNicknameGiven)?;
    if !is_valid_nick(nick) {
        return Err(CommandError::ErroneousNickname(nick.to_string()));
    }
    if net.find_nick(nick).is_some() {
        return Err(CommandError::NicknameInUse(nick.to_string()));
    }
    if let Some(reg) = registration_mut(net, conn) {
        reg.nick = Some(nick.to_string());
    }
    Ok(())
}

fn user(net: &mut Network, conn: ConnId, line: &Line<'_>) -> Result<(), CommandError> {
    if line.params.len() < 4 {
        return Err(CommandError::NeedMoreParams);
    }
    let user: String = line.params[0]
        .chars()
        .filter(|c| c.is_ascii_graphic() && *c != '@')
        .take(USERLEN)
        .collect();
    if let Some(reg) = registration_mut(net, conn) {
        reg.user = Some(if user.is_empty() { "unknown".to_string() } else { user });
        reg.realname = Some(line.params[3].to_string());
    }
    Ok(())
}

/// `PASS <password> [TS 6 :<sid>]`
fn pass(net: &mut Network, conn: ConnId, line: &Line<'_>) -> Result<(), CommandError> {
    let password = line.param(0).ok_or(CommandError::NeedMoreParams)?;
    let ts6_sid = match (line.param(1), line.param(2), line.param(3)) {
        (Some("TS"), Some("6"), Some(sid)) => Some(sid.to_string()),
        _ => None,
    };
    if let Some(reg) = registration_mut(net, conn) {
        reg.pass = Some(password.to_string());
        reg.ts6_sid = ts6_sid;
    }
    Ok(())
}

fn capab(net: &mut Network, conn: ConnId, line: &Line<'_>) -> Result<(), CommandError> {
    let tokens = line.param(0).ok_or(CommandError::NeedMoreParams)?;
    if let Some(reg) = registration_mut(net, conn) {
        reg.caps = Some(reg.caps.unwrap_or_default() | Caps::from_tokens(tokens));
    }
    Ok(())
}

fn try_register_client(net: &mut Network, conn: ConnId) {
    let Some(reg) = registration(net, conn) else {
        return;
    };
    if reg.ts6_sid.is_some() {
        return;
    }
    let (Some(nick), Some(user)) = (reg.nick.clone(), reg.user.clone()) else {
        return;
    };
    let realname = reg.realname.clone().unwrap_or_default();

    // Someone may have taken the nick since it was accepted.
    if net.find_nick(&nick).is_some() {
        if let Some(reg) = registration_mut(net, conn) {
            reg.nick = None;
        }
        let reply = CommandError::NicknameInUse(nick.clone()).to_reply(net.name(), "*", "NICK");
        if let Some(reply) = reply {
            net.send_to_conn(conn, &reply);
        }
        return;
    }

    let Some((host, ip)) = net.conns.get(&conn).map(|c| (c.host.clone(), c.ip.clone())) else {
        return;
    };
    let uid = net.generate_uid();
    let info = ClientInfo {
        nick: nick.clone(),
        user,
        host,
        ip,
        realname,
        server: net.name().to_string(),
        ts: net.now(),
        ..Default::default()
    };
    let id = net.add_client(uid.clone(), info, Origin::Local(conn));
    if let Some(c) = net.conns.get_mut(&conn) {
        c.role = Role::Client(id);
    }
    info!(%nick, %uid, "client registered");

    let me = net.name().to_string();
    let network = net.config.server.network.clone();
    let version = concat!("meshircd-", env!("CARGO_PKG_VERSION"));
    let chanmodes = net.modes.chanmodes();
    let modes = net.config.limits.max_mode_params;
    let welcome = [
        numeric(
            &me,
            replies::RPL_WELCOME,
            &nick,
            &format!(":Welcome to the {network} Internet Relay Chat Network {nick}"),
        ),
        numeric(
            &me,
            replies::RPL_YOURHOST,
            &nick,
            &format!(":Your host is {me}, running version {version}"),
        ),
        numeric(&me, replies::RPL_MYINFO, &nick, &format!("{me} {version} ioSw bCFILPQcefgijklmnopqrstvz")),
        numeric(
            &me,
            replies::RPL_ISUPPORT,
            &nick,
            &format!(
                "CHANTYPES=#& CHANMODES={chanmodes} PREFIX=(ov)@+ EXCEPTS INVEX MODES={modes} \
                 NICKLEN={MAX_NICK_LEN} NETWORK={network} EXTBAN=$,{} :are supported by this server",
                net.extbans.kinds()
            ),
        ),
    ];
    for line in &welcome {
        net.send_to_conn(conn, line);
    }
    net.introduce_client(id, None);
}

/// Our half of the link handshake.
pub fn send_handshake(net: &mut Network, conn: ConnId, block: &LinkBlock) {
    let lines = [
        format!("PASS {} TS 6 :{}", block.password, net.sid()),
        format!("CAPAB :{}", Caps::ours().to_tokens()),
        format!("SERVER {} 1 :{}", net.name(), net.config.server.description),
    ];
    for line in &lines {
        net.send_to_conn(conn, line);
    }
}

impl Network {
    /// Mark `conn` as a connection we dialed for link block `name` and send
    /// our handshake.
    pub fn begin_outbound(&mut self, conn: ConnId, name: &str) -> bool {
        let Some(block) = self.config.link(name).cloned() else {
            return false;
        };
        if let Some(reg) = registration_mut(self, conn) {
            reg.outbound = Some(block.name.clone());
        }
        send_handshake(self, conn, &block);
        true
    }
}

/// `SERVER <name> <hopcount> :<description>`
fn accept_server(net: &mut Network, conn: ConnId, line: &Line<'_>) -> Result<(), LinkError> {
    let name = line
        .param(0)
        .ok_or_else(|| LinkError::Protocol("SERVER without a name".into()))?;
    let description = line.params.last().copied().unwrap_or_default().to_string();
    let block = net
        .config
        .link(name)
        .cloned()
        .ok_or_else(|| LinkError::NoLinkBlock(name.to_string()))?;
    let reg = registration(net, conn).ok_or_else(|| LinkError::Protocol("already registered".into()))?;

    let sid = reg.ts6_sid.clone().ok_or(LinkError::NotTs6)?;
    if reg.pass.as_deref() != Some(block.password.as_str()) {
        return Err(LinkError::BadPassword);
    }
    if block.sid.as_deref().is_some_and(|expected| expected != sid) {
        return Err(LinkError::SidMismatch(sid));
    }
    if net.topology.contains(&sid) {
        return Err(LinkError::SidInUse(sid));
    }
    if net.topology.by_name(name).is_some() {
        return Err(LinkError::ServerExists(name.to_string()));
    }
    let caps = reg.caps.unwrap_or_default() | Caps::TS6;
    let outbound = reg.outbound.is_some();

    if !outbound {
        send_handshake(net, conn, &block);
    }
    let link = net.attach_link(conn, name, &sid, caps);
    let me = net.sid().to_string();
    net.topology.add_server(ServerInfo {
        sid: sid.clone(),
        name: name.to_string(),
        info: description.clone(),
        hopcount: 1,
        via: Some(me.clone()),
        link: Some(link),
    });

    let b = net.broadcast(Some(link));
    net.relay(
        &b,
        Caps::TS6,
        Caps::empty(),
        &[format!(":{me} SID {name} 2 {sid} :{description}")],
    );
    net.send_burst(link);
    net.notice_opers(&format!("Link with {name}[{sid}] established"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::Registry;
    use crate::config::Config;

    fn network() -> Network {
        let mut config = Config::new("hub.mesh", "0HB");
        config.links.push(LinkBlock {
            name: "leaf.mesh".into(),
            hostname: "127.0.0.1".into(),
            port: 7000,
            password: "linkpass".into(),
            sid: Some("1LF".into()),
            autoconnect: false,
            sendq: None,
        });
        Network::new(Arc::new(config))
    }

    fn queued(net: &Network, conn: ConnId) -> Vec<String> {
        net.conns.get(&conn).map(|c| c.sendq.lines()).unwrap_or_default()
    }

    #[test]
    fn client_registration_sends_welcome() {
        let mut net = network();
        let registry = Registry::new();
        let conn = net.add_conn("host.example", "192.0.2.1");
        registry.process(&mut net, conn, "NICK alice");
        assert!(queued(&net, conn).is_empty());
        registry.process(&mut net, conn, "USER al 0 * :Alice Liddell");

        let lines = queued(&net, conn);
        assert!(lines[0].starts_with(":hub.mesh 001 alice :Welcome"));
        assert!(lines.iter().any(|l| l.contains("CHANMODES=eIbq,k,flj,")));
        let id = net.find_nick("alice").unwrap();
        assert_eq!(net.client(id).unwrap().realname, "Alice Liddell");
        assert!(matches!(net.conns[&conn].role, Role::Client(_)));
    }

    #[test]
    fn commands_before_registration_are_refused() {
        let mut net = network();
        let registry = Registry::new();
        let conn = net.add_conn("host.example", "192.0.2.1");
        registry.process(&mut net, conn, "JOIN #a");
        assert_eq!(queued(&net, conn), vec![":hub.mesh 451 * :You have not registered"]);
    }

    #[test]
    fn bad_and_taken_nicks() {
        let mut net = network();
        let registry = Registry::new();
        let first = net.add_conn("host.example", "192.0.2.1");
        registry.process(&mut net, first, "NICK alice");
        registry.process(&mut net, first, "USER a 0 * :a");

        let second = net.add_conn("host.example", "192.0.2.2");
        registry.process(&mut net, second, "NICK 9lives");
        registry.process(&mut net, second, "NICK ALICE");
        let lines = queued(&net, second);
        assert!(lines[0].contains(" 432 * 9lives "));
        assert!(lines[1].contains(" 433 * ALICE "));
    }

    #[test]
    fn link_handshake_accepts_matching_block() {
        let mut net = network();
        let registry = Registry::new();
        let conn = net.add_conn("leaf.mesh", "127.0.0.1");
        registry.process(&mut net, conn, "PASS linkpass TS 6 :1LF");
        registry.process(&mut net, conn, "CAPAB :QS EX IE ENCAP SERVICES MLOCK");
        registry.process(&mut net, conn, "SERVER leaf.mesh 1 :Leaf server");

        let link = net.link_by_conn(conn).unwrap();
        assert_eq!(net.links[&link].caps, Caps::QS | Caps::EX | Caps::IE | Caps::ENCAP | Caps::SERVICES | Caps::MLOCK | Caps::TS6);
        assert!(net.topology.contains("1LF"));
        let lines = queued(&net, conn);
        assert_eq!(lines[0], "PASS linkpass TS 6 :0HB");
        assert!(lines[1].starts_with("CAPAB :"));
        assert_eq!(lines[2], "SERVER hub.mesh 1 :meshircd");
    }

    #[test]
    fn link_handshake_rejects_bad_password() {
        let mut net = network();
        let registry = Registry::new();
        let conn = net.add_conn("leaf.mesh", "127.0.0.1");
        registry.process(&mut net, conn, "PASS wrong TS 6 :1LF");
        registry.process(&mut net, conn, "SERVER leaf.mesh 1 :Leaf server");
        assert!(!net.conns.contains_key(&conn));
        assert!(net.links.is_empty());
        let closed = net.take_closed();
        let (_, bytes) = &closed[0];
        let text = String::from_utf8_lossy(bytes.as_deref().unwrap_or_default()).to_string();
        assert!(text.contains("ERROR :Closing Link: Invalid password"));
    }

    #[test]
    fn link_handshake_requires_ts6() {
        let mut net = network();
        let registry = Registry::new();
        let conn = net.add_conn("leaf.mesh", "127.0.0.1");
        registry.process(&mut net, conn, "PASS linkpass");
        registry.process(&mut net, conn, "SERVER leaf.mesh 1 :Leaf server");
        assert!(net.links.is_empty());
    }
}
