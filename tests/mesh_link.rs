//! Two servers linked in-process: handshake, burst, and channel traffic
//! crossing the link.

mod common;

use common::{Mesh, START};
use meshircd::state::{ChannelModes, ListKind, MemberFlags};

#[test]
fn burst_introduces_clients_and_channels() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.hub.send(alice, "MODE #mesh +sk sesame");
    mesh.hub.send(alice, "MODE #mesh +b *!*@spam.example");
    mesh.hub.drain(alice);

    mesh.link();

    let leaf = &mesh.leaf;
    let alice_there = leaf.client("alice");
    assert_eq!(leaf.net.client(alice_there).map(|c| c.server.as_str()), Some("hub.mesh"));
    let chan = leaf.channel("#mesh");
    let ch = leaf.net.channel(chan).unwrap();
    assert_eq!(ch.ts, START);
    assert!(ch.modes.contains(ChannelModes::SECRET | ChannelModes::NOPRIVMSGS | ChannelModes::TOPICLIMIT));
    assert_eq!(ch.params.key.as_deref(), Some("sesame"));
    assert!(ch.list(ListKind::Ban).contains_exact("*!*@spam.example"));
    assert_eq!(leaf.flags("#mesh", "alice"), Some(MemberFlags::CHANOP));
    assert!(leaf.net.topology.contains("0HB"));
}

#[test]
fn joins_messages_and_modes_cross_the_link() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    let bob = mesh.leaf.connect("bob");
    mesh.link();
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.pump();
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.pump();
    mesh.hub.drain(alice);
    mesh.leaf.drain(bob);
    assert_eq!(mesh.hub.flags("#mesh", "bob"), Some(MemberFlags::empty()));

    mesh.leaf.send(bob, "PRIVMSG #mesh :hello hub");
    mesh.pump();
    assert_eq!(mesh.hub.drain(alice), vec![":bob!bob@host.example PRIVMSG #mesh :hello hub"]);
    assert!(mesh.leaf.drain(bob).is_empty());

    mesh.hub.send(alice, "MODE #mesh +mv bob");
    mesh.pump();
    assert_eq!(mesh.leaf.drain(bob), vec![":alice!alice@host.example MODE #mesh +mv bob"]);
    assert_eq!(mesh.leaf.flags("#mesh", "bob"), Some(MemberFlags::VOICE));
    let chan = mesh.leaf.channel("#mesh");
    assert!(mesh.leaf.net.channel(chan).unwrap().modes.contains(ChannelModes::MODERATED));
}

#[test]
fn chanop_only_lists_stay_with_chanops() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    let bob = mesh.leaf.connect("bob");
    mesh.link();
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.pump();
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.pump();
    mesh.hub.drain(alice);
    mesh.leaf.drain(bob);

    mesh.hub.send(alice, "MODE #mesh +e *!*@friend.example");
    mesh.pump();
    assert_eq!(mesh.hub.drain(alice), vec![":alice!alice@host.example MODE #mesh +e *!*@friend.example"]);
    assert!(mesh.leaf.drain(bob).is_empty());
    let chan = mesh.leaf.channel("#mesh");
    assert!(mesh.leaf.net.channel(chan).unwrap().list(ListKind::Except).contains_exact("*!*@friend.example"));
}

#[test]
fn older_channel_wins_on_both_sides() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.hub.send(alice, "MODE #mesh +m");
    mesh.hub.drain(alice);

    mesh.leaf.set_clock(START - 100_000);
    let bob = mesh.leaf.connect("bob");
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.leaf.drain(bob);
    mesh.leaf.set_clock(START);

    mesh.link();

    for node in [&mesh.hub, &mesh.leaf] {
        assert_eq!(node.channel_ts("#mesh"), START - 100_000, "{}", node.net.name());
        assert_eq!(node.flags("#mesh", "alice"), Some(MemberFlags::empty()), "{}", node.net.name());
        assert_eq!(node.flags("#mesh", "bob"), Some(MemberFlags::CHANOP), "{}", node.net.name());
        let ch = node.net.channel(node.channel("#mesh")).unwrap();
        assert!(!ch.modes.contains(ChannelModes::MODERATED), "{}", node.net.name());
    }

    let seen = mesh.hub.drain(alice);
    assert!(seen.contains(&":hub.mesh MODE #mesh -o alice".to_string()), "{seen:?}");
    assert!(seen.contains(&format!(
        ":hub.mesh NOTICE #mesh :*** Notice -- TS for #mesh changed from {START} to {}",
        START - 100_000
    )));
    assert!(seen.contains(&":bob!bob@host.example JOIN #mesh".to_string()), "{seen:?}");

    let seen = mesh.leaf.drain(bob);
    assert_eq!(seen, vec![":alice!alice@host.example JOIN #mesh"]);
}

#[test]
fn equal_timestamps_merge_modes() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.hub.send(alice, "MODE #mesh +l 10");
    let bob = mesh.leaf.connect("bob");
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.leaf.send(bob, "MODE #mesh +ml 25");
    mesh.hub.drain(alice);
    mesh.leaf.drain(bob);

    mesh.link();

    for node in [&mesh.hub, &mesh.leaf] {
        let ch = node.net.channel(node.channel("#mesh")).unwrap();
        assert_eq!(ch.ts, START);
        assert!(ch.modes.contains(ChannelModes::MODERATED), "{}", node.net.name());
        assert_eq!(ch.params.limit, Some(25), "{}", node.net.name());
        assert_eq!(node.flags("#mesh", "alice"), Some(MemberFlags::CHANOP));
        assert_eq!(node.flags("#mesh", "bob"), Some(MemberFlags::CHANOP));
    }
}

#[test]
fn split_quits_remote_clients() {
    let mut mesh = Mesh::new();
    let alice = mesh.hub.connect("alice");
    let bob = mesh.leaf.connect("bob");
    mesh.link();
    mesh.hub.send(alice, "JOIN #mesh");
    mesh.pump();
    mesh.leaf.send(bob, "JOIN #mesh");
    mesh.pump();
    mesh.hub.drain(alice);

    mesh.split("Connection reset");
    assert!(!mesh.is_linked());
    assert_eq!(mesh.hub.drain(alice), vec![":bob!bob@host.example QUIT :hub.mesh leaf.mesh"]);
    assert!(mesh.hub.net.find_nick("bob").is_none());
    assert!(!mesh.hub.net.topology.contains("1LF"));
    assert_eq!(mesh.hub.flags("#mesh", "alice"), Some(MemberFlags::CHANOP));
}

#[test]
fn older_nick_survives_a_collision() {
    let mut mesh = Mesh::new();
    mesh.leaf.set_clock(START - 10);
    let old = mesh.leaf.connect("alice");
    mesh.leaf.set_clock(START);
    let new = mesh.hub.connect("alice");

    mesh.link();

    assert!(!mesh.hub.net.conns.contains_key(&new));
    let closed = mesh.hub.net.take_closed();
    let (_, last) = closed.iter().find(|(conn, _)| *conn == new).expect("hub closed its alice");
    let text = String::from_utf8_lossy(last.as_deref().unwrap_or_default()).to_string();
    assert!(text.starts_with(":hub.mesh KILL alice :Nick collision (old)\r\n"), "{text}");
    assert!(mesh.leaf.drain(old).is_empty());
    let hub_alice = mesh.hub.client("alice");
    assert_eq!(mesh.hub.net.client(hub_alice).map(|c| c.server.as_str()), Some("leaf.mesh"));
    assert_eq!(mesh.leaf.net.clients.len(), 1);
}
