//! Mode changes reach each peer in the form its capabilities allow.

mod common;

use common::Node;
use meshircd::config::Config;
use meshircd::propagate::{Caps, LinkId, ServerInfo};
use meshircd::state::ConnId;

fn peer(node: &mut Node, name: &str, sid: &str, caps: Caps) -> (LinkId, ConnId) {
    let conn = node.net.add_conn(name, "127.0.0.1");
    let link = node.net.attach_link(conn, name, sid, caps | Caps::TS6);
    let via = node.net.sid().to_string();
    node.net.topology.add_server(ServerInfo {
        sid: sid.into(),
        name: name.into(),
        info: String::new(),
        hopcount: 1,
        via: Some(via),
        link: Some(link),
    });
    (link, conn)
}

#[test]
fn exceptions_only_reach_peers_that_understand_them() {
    let mut node = Node::new(Config::new("hub.mesh", "0HB"));
    let alice = node.connect("alice");
    let (_, full) = peer(&mut node, "full.mesh", "1FL", Caps::EX | Caps::IE);
    let (_, plain) = peer(&mut node, "plain.mesh", "2PL", Caps::empty());
    node.send(alice, "JOIN #mesh");
    node.drain(alice);
    node.drain(full);
    node.drain(plain);
    let uid = node.net.client(node.client("alice")).unwrap().uid.clone();

    node.send(alice, "MODE #mesh +beI *!*@bad.example *!*@good.example *!*@guest.example");
    assert_eq!(
        node.drain(alice),
        vec![
            ":alice!alice@host.example MODE #mesh +b *!*@bad.example",
            ":alice!alice@host.example MODE #mesh +eI *!*@good.example *!*@guest.example",
        ]
    );
    assert_eq!(
        node.drain(full),
        vec![format!(":{uid} TMODE 1000000 #mesh +beI *!*@bad.example *!*@good.example *!*@guest.example")]
    );
    assert_eq!(node.drain(plain), vec![format!(":{uid} TMODE 1000000 #mesh +b *!*@bad.example")]);
}

#[test]
fn one_line_per_peer_for_a_channel_message() {
    let mut node = Node::new(Config::new("hub.mesh", "0HB"));
    let alice = node.connect("alice");
    let (a, a_conn) = peer(&mut node, "a.mesh", "1AA", Caps::empty());
    let (_, b_conn) = peer(&mut node, "b.mesh", "2BB", Caps::empty());
    node.send(alice, "JOIN #mesh");
    let from_a = node.net.links[&a].conn;
    node.send(from_a, ":1AA UID carol 1 10 + c c.example 0 1AAAAAAAB :Carol");
    node.send(from_a, ":1AA UID dave 1 10 + d d.example 0 1AAAAAAAC :Dave");
    node.send(from_a, ":1AAAAAAAB JOIN 1000000 #mesh +");
    node.send(from_a, ":1AAAAAAAC JOIN 1000000 #mesh +");
    node.drain(alice);
    node.drain(a_conn);
    node.drain(b_conn);

    let uid = node.net.client(node.client("alice")).unwrap().uid.clone();
    node.send(alice, "PRIVMSG #mesh :once each");
    assert_eq!(node.drain(a_conn), vec![format!(":{uid} PRIVMSG #mesh :once each")]);
    assert!(node.drain(b_conn).is_empty());
    assert!(node.drain(alice).is_empty());
}
