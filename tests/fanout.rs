//! Fan-out across more than one link: each peer hears an event once, and a
//! peer that cannot keep up is cut off.

mod common;

use common::{Mesh, Star, link_block};
use meshircd::config::Config;
use meshircd::propagate::{Caps, LinkId};

#[test]
fn relayed_change_reaches_the_other_leaf_once() {
    let mut star = Star::new();
    let alice = star.a.node.connect("alice");
    let bob = star.b.node.connect("bob");
    let carol = star.hub.connect("carol");
    star.link();
    star.a.node.send(alice, "JOIN #mesh");
    star.pump();
    star.b.node.send(bob, "JOIN #mesh");
    star.hub.send(carol, "JOIN #mesh");
    star.pump();
    star.a.node.drain(alice);
    star.b.node.drain(bob);
    star.hub.drain(carol);

    let uid = {
        let node = &star.a.node;
        node.net.client(node.client("alice")).unwrap().uid.clone()
    };
    let (to_a, to_b) = (star.link_to(&star.a), star.link_to(&star.b));
    let queued = |star: &Star, link: LinkId| {
        let conn = star.hub.net.links[&link].conn;
        star.hub.net.conns[&conn].sendq.lines()
    };

    star.a.node.send(alice, "MODE #mesh +m");
    star.a.node.drain(alice);
    star.deliver_up_from_a();
    assert_eq!(queued(&star, to_b), vec![format!(":{uid} TMODE 1000000 #mesh +m")]);
    assert!(queued(&star, to_a).is_empty());
    assert_eq!(star.hub.drain(carol), vec![":alice!alice@host.example MODE #mesh +m"]);

    // The same event relayed network-wide and re-derived for the channel's
    // remote members, in one pass.
    let line = format!(":{uid} PRIVMSG #mesh :once");
    let chan = star.hub.channel("#mesh");
    let pass = star.hub.net.broadcast(Some(to_a));
    assert_eq!(star.hub.net.relay(&pass, Caps::TS6, Caps::empty(), &[line.clone()]), 1);
    assert_eq!(star.hub.net.flood_channel_remote(&pass, chan, &line), 0);
    assert_eq!(queued(&star, to_b).len(), 2);
    assert!(queued(&star, to_a).is_empty());

    star.pump();
    assert_eq!(
        star.b.node.drain(bob),
        vec![
            ":alice!alice@host.example MODE #mesh +m".to_string(),
            ":alice!alice@host.example PRIVMSG #mesh :once".to_string(),
        ]
    );
    assert!(star.a.node.drain(alice).is_empty());
}

#[test]
fn overflowing_link_is_dropped_and_gets_nothing_more() {
    let mut hub = Config::new("hub.mesh", "0HB");
    let mut block = link_block("leaf.mesh", "1LF", 7000);
    block.sendq = Some(4096);
    hub.links.push(block);
    let mut leaf = Config::new("leaf.mesh", "1LF");
    leaf.links.push(link_block("hub.mesh", "0HB", 7000));
    let mut mesh = Mesh::from_configs(hub, leaf);
    let alice = mesh.hub.connect("alice");
    let bob = mesh.leaf.connect("bob");
    mesh.link();
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.pump();
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.pump();
    mesh.hub.drain(alice);
    let hub_side = mesh.hub_side();

    // The leaf stops reading while alice floods the channel.
    let mut commands = 0;
    while mesh.is_linked() {
        let modes = if commands % 2 == 0 { "+m" } else { "-m" };
        mesh.hub.send(alice, &format!("MODE #mesh {modes}"));
        mesh.hub.send(alice, &format!("PRIVMSG #mesh :{}", "x".repeat(200)));
        commands += 1;
        assert!(commands < 1000, "link never overflowed");
    }

    assert!(!mesh.hub.net.conns.contains_key(&hub_side));
    assert!(mesh.hub.net.find_nick("bob").is_none());
    assert!(!mesh.hub.net.topology.contains("1LF"));
    let seen = mesh.hub.drain(alice);
    assert_eq!(seen.last().unwrap(), ":bob!bob@host.example QUIT :hub.mesh leaf.mesh");

    let closed = mesh.hub.net.take_closed();
    let (_, last) = closed
        .iter()
        .find(|(conn, _)| *conn == hub_side)
        .expect("hub closed the link");
    assert!(last.as_deref().unwrap_or_default().is_empty());

    mesh.hub.send(alice, "MODE #mesh +s");
    mesh.hub.send(alice, "PRIVMSG #mesh :anyone there?");
    assert!(mesh.hub.net.take_closed().is_empty());
    assert!(mesh.hub.net.links.is_empty());
    assert_eq!(mesh.hub.drain(alice), vec![":alice!alice@host.example MODE #mesh +s"]);
}
