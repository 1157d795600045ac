//! Clients and servers leaving: quits, kills, splits and the reaper.

use tracing::{debug, info};

use crate::propagate::{Caps, LinkId};
use crate::state::{ClientId, ConnId, Network, Role};

enum Dead {
    Client(ClientId),
    Server(LinkId),
    Unregistered,
}

impl Network {
    /// Tell local channel peers, close the connection if local, and forget
    /// the client. Returns its UID.
    pub(super) fn remove_quitting(&mut self, id: ClientId, reason: &str) -> Option<String> {
        let (mask, host, conn) = {
            let c = self.client(id)?;
            (c.hostmask(), c.host.clone(), c.conn())
        };
        self.send_to_common_channels(id, &format!(":{mask} QUIT :{reason}"));
        if let Some(conn) = conn {
            self.send_to_conn(conn, &format!("ERROR :Closing Link: {host} ({reason})"));
            self.drop_conn(conn);
        }
        let client = self.remove_client(id)?;
        debug!(nick = %client.nick, uid = %client.uid, %reason, "client exited");
        Some(client.uid)
    }

    /// A client leaves the network. Peers hear `QUIT` except on `from`.
    pub fn exit_client(&mut self, id: ClientId, reason: &str, from: Option<LinkId>) {
        let Some(uid) = self.remove_quitting(id, reason) else {
            return;
        };
        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} QUIT :{reason}")]);
    }

    /// Remove `sid` and everything behind it. Their clients quit with the
    /// usual `<uplink> <server>` split reason, without per-client relays;
    /// the remaining links hear one `SQUIT`.
    pub fn split_server(&mut self, sid: &str, reason: &str, from: Option<LinkId>) {
        let Some(server) = self.topology.get(sid) else {
            return;
        };
        let name = server.name.clone();
        let uplink = server
            .via
            .as_deref()
            .and_then(|via| self.topology.get(via))
            .map_or_else(|| self.name().to_string(), |s| s.name.clone());
        let split_reason = format!("{uplink} {name}");

        let sids = self.topology.downstream(sid);
        let mut victims: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.uid.get(..3).is_some_and(|s| sids.iter().any(|x| x == s)))
            .map(|c| c.id)
            .collect();
        victims.sort();
        for id in &victims {
            self.remove_quitting(*id, &split_reason);
        }
        self.topology.remove_servers(&sids);

        let me = self.sid().to_string();
        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{me} SQUIT {sid} :{reason}")]);
        info!(server = %name, servers = sids.len(), clients = victims.len(), %reason, "netsplit");
        self.notice_opers(&format!("Netsplit {split_reason} ({reason})"));
    }

    /// Tear down a direct link and everything reached through it.
    pub fn squit_link(&mut self, link: LinkId, reason: &str) {
        let Some((sid, conn)) = self.links.get(&link).map(|l| (l.sid.clone(), l.conn)) else {
            return;
        };
        self.split_server(&sid, reason, Some(link));
        self.detach_link(link);
        self.drop_conn(conn);
    }

    /// The runtime lost a connection.
    pub fn connection_lost(&mut self, conn: ConnId, reason: &str) {
        if let Some(c) = self.conns.get_mut(&conn)
            && c.dead.is_none()
        {
            c.dead = Some(reason.to_string());
            self.dead.push(conn);
        }
        self.reap_dead();
    }

    /// Finish off connections that died during the last command.
    pub fn reap_dead(&mut self) {
        while !self.dead.is_empty() {
            for conn in std::mem::take(&mut self.dead) {
                let Some(c) = self.conns.get(&conn) else {
                    continue;
                };
                let reason = c.dead.clone().unwrap_or_else(|| "Connection closed".to_string());
                let dead = match c.role {
                    Role::Client(id) => Dead::Client(id),
                    Role::Server(link) => Dead::Server(link),
                    Role::Unregistered(_) => Dead::Unregistered,
                };
                match dead {
                    Dead::Client(id) => self.exit_client(id, &reason, None),
                    Dead::Server(link) => self.squit_link(link, &reason),
                    Dead::Unregistered => self.drop_conn(conn),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::propagate::ServerInfo;
    use crate::state::{ClientInfo, MemberFlags, Origin};

    fn network() -> Network {
        Network::new(Arc::new(Config::new("hub.mesh", "0HB")))
    }

    fn local(net: &mut Network, nick: &str) -> (ClientId, ConnId) {
        let conn = net.add_conn("host.example", "192.0.2.1");
        let uid = net.generate_uid();
        let id = net.add_client(
            uid,
            ClientInfo {
                nick: nick.into(),
                user: "u".into(),
                host: "host.example".into(),
                ip: "192.0.2.1".into(),
                ..Default::default()
            },
            Origin::Local(conn),
        );
        if let Some(c) = net.conns.get_mut(&conn) {
            c.role = Role::Client(id);
        }
        (id, conn)
    }

    fn leaf(net: &mut Network, name: &str, sid: &str) -> LinkId {
        let conn = net.add_conn(name, "192.0.2.50");
        let link = net.attach_link(conn, name, sid, Caps::TS6);
        let via = net.sid().to_string();
        net.topology.add_server(ServerInfo {
            sid: sid.into(),
            name: name.into(),
            info: String::new(),
            hopcount: 1,
            via: Some(via),
            link: Some(link),
        });
        link
    }

    fn queued(net: &Network, conn: ConnId) -> Vec<String> {
        net.conns.get(&conn).map(|c| c.sendq.lines()).unwrap_or_default()
    }

    #[test]
    fn quit_reaches_channel_peers_once() {
        let mut net = network();
        let (alice, _) = local(&mut net, "alice");
        let (bob, bob_conn) = local(&mut net, "bob");
        for name in ["#a", "#b"] {
            let (chan, _) = net.get_or_create_channel(name, 100);
            net.add_member(chan, alice, MemberFlags::empty());
            net.add_member(chan, bob, MemberFlags::empty());
        }
        net.exit_client(alice, "Quit: bye", None);
        assert_eq!(queued(&net, bob_conn), vec![":alice!u@host.example QUIT :Quit: bye"]);
        assert!(net.find_nick("alice").is_none());
        assert_eq!(net.take_closed().len(), 1);
    }

    #[test]
    fn sendq_overflow_kills_a_client_after_the_command() {
        let mut net = network();
        let (alice, conn) = local(&mut net, "alice");
        net.conns.get_mut(&conn).unwrap().sendq.set_ceiling(16);
        net.send_to_client(alice, "this line is far too long for the queue");
        assert!(net.conns[&conn].is_dead());
        assert!(net.find_nick("alice").is_some());
        net.reap_dead();
        assert!(net.find_nick("alice").is_none());
        assert!(!net.conns.contains_key(&conn));
    }

    #[test]
    fn split_removes_downstream_servers_and_clients() {
        let mut net = network();
        let a = leaf(&mut net, "a.mesh", "0AA");
        let b = leaf(&mut net, "b.mesh", "0BB");
        net.topology.add_server(ServerInfo {
            sid: "0CC".into(),
            name: "c.mesh".into(),
            info: String::new(),
            hopcount: 2,
            via: Some("0AA".into()),
            link: Some(a),
        });
        let (bob, bob_conn) = local(&mut net, "bob");
        let carol = net.add_client(
            "0CCAAAAAB".into(),
            ClientInfo {
                nick: "carol".into(),
                user: "c".into(),
                host: "c.example".into(),
                ..Default::default()
            },
            Origin::Remote(a),
        );
        let (chan, _) = net.get_or_create_channel("#a", 100);
        net.add_member(chan, bob, MemberFlags::empty());
        net.add_member(chan, carol, MemberFlags::empty());

        net.squit_link(a, "Ping timeout");
        assert!(!net.topology.contains("0AA"));
        assert!(!net.topology.contains("0CC"));
        assert!(net.find_nick("carol").is_none());
        assert!(!net.links.contains_key(&a));
        assert_eq!(queued(&net, bob_conn), vec![":carol!c@c.example QUIT :hub.mesh a.mesh"]);

        let b_conn = net.links[&b].conn;
        assert_eq!(queued(&net, b_conn), vec![":0HB SQUIT 0AA :Ping timeout"]);
    }

    #[test]
    fn dead_link_is_squit_on_reap() {
        let mut net = network();
        let a = leaf(&mut net, "a.mesh", "0AA");
        let conn = net.links[&a].conn;
        net.connection_lost(conn, "Connection reset by peer");
        assert!(net.links.is_empty());
        assert!(!net.topology.contains("0AA"));
    }
}
