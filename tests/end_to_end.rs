//! Real sockets: clients on one daemon, and two daemons linked over TCP.

mod common;

use std::time::Duration;

use common::{TestClient, link_block, spawn_server};
use meshircd::config::Config;

#[tokio::test]
async fn channel_message_between_local_clients() {
    let addr = spawn_server(Config::new("hub.mesh", "0HB")).await;
    let mut alice = TestClient::connect(addr, "alice").await.expect("connect alice");
    let mut bob = TestClient::connect(addr, "bob").await.expect("connect bob");
    alice.register().await.expect("alice registers");
    bob.register().await.expect("bob registers");

    alice.join("#test").await.unwrap();
    alice.joined("#test").await.unwrap();
    bob.join("#test").await.unwrap();
    bob.joined("#test").await.unwrap();

    alice.privmsg("#test", "hello from alice").await.unwrap();
    let seen = bob
        .recv_until(|l| l.contains("PRIVMSG #test"))
        .await
        .expect("bob hears alice");
    assert_eq!(seen.last().unwrap(), ":alice!alice@127.0.0.1 PRIVMSG #test :hello from alice");
}

#[tokio::test]
async fn mode_errors_are_reported_once_per_command() {
    let addr = spawn_server(Config::new("hub.mesh", "0HB")).await;
    let mut alice = TestClient::connect(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect(addr, "bob").await.unwrap();
    alice.register().await.unwrap();
    bob.register().await.unwrap();
    alice.join("#test").await.unwrap();
    alice.joined("#test").await.unwrap();
    bob.join("#test").await.unwrap();
    bob.joined("#test").await.unwrap();

    bob.send_raw("MODE #test +mns").await.unwrap();
    bob.send_raw("PING :done").await.unwrap();
    let seen = bob.recv_until(|l| l.contains("PONG")).await.unwrap();
    let denied: Vec<_> = seen.iter().filter(|l| l.contains(" 482 ")).collect();
    assert_eq!(denied.len(), 1, "{seen:?}");
}

#[tokio::test]
async fn two_daemons_link_and_relay() {
    let mut leaf = Config::new("leaf.mesh", "1LF");
    leaf.links.push(link_block("hub.mesh", "0HB", 0));
    let leaf_addr = spawn_server(leaf).await;

    let mut bob = TestClient::connect(leaf_addr, "bob").await.unwrap();
    bob.register().await.unwrap();
    bob.join("#mesh").await.unwrap();
    bob.joined("#mesh").await.unwrap();

    let mut hub = Config::new("hub.mesh", "0HB");
    let mut block = link_block("leaf.mesh", "1LF", leaf_addr.port());
    block.autoconnect = true;
    hub.links.push(block);
    let hub_addr = spawn_server(hub).await;

    let mut alice = TestClient::connect(hub_addr, "alice").await.unwrap();
    alice.register().await.unwrap();
    alice.join("#mesh").await.unwrap();
    // Depending on whether the burst lands first, bob shows up in NAMES or
    // as a JOIN.
    alice
        .recv_until(|l| l == ":bob!bob@127.0.0.1 JOIN #mesh" || (l.contains(" 353 ") && l.contains("bob")))
        .await
        .expect("alice sees bob once the link is up");

    alice.privmsg("#mesh", "across the mesh").await.unwrap();
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        bob.recv_until(|l| l.contains("PRIVMSG #mesh")),
    )
    .await
    .expect("timed out")
    .unwrap();
    assert_eq!(seen.last().unwrap(), ":alice!alice@127.0.0.1 PRIVMSG #mesh :across the mesh");
}
