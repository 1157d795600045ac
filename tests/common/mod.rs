//! Integration test common infrastructure.
//!
//! [`Node`] drives one in-process network through the public command
//! registry. [`Mesh`] links two nodes by shuttling queued output between
//! their link connections, and [`Star`] does the same for a hub with two
//! leaves. [`TestClient`] talks to a real listener.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use meshircd::commands::Registry;
use meshircd::config::{Config, LinkBlock};
use meshircd::propagate::LinkId;
use meshircd::runtime::Server;
use meshircd::state::{ChannelId, ClientId, ConnId, MemberFlags, Network};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

pub const LINK_PASSWORD: &str = "linkpass";
pub const START: i64 = 1_000_000;

/// Link block pointing at a peer on localhost.
pub fn link_block(name: &str, sid: &str, port: u16) -> LinkBlock {
    LinkBlock {
        name: name.to_string(),
        hostname: "127.0.0.1".to_string(),
        port,
        password: LINK_PASSWORD.to_string(),
        sid: Some(sid.to_string()),
        autoconnect: false,
        sendq: None,
    }
}

/// One server with its registry and a frozen clock.
pub struct Node {
    pub net: Network,
    pub registry: Registry,
}

impl Node {
    pub fn new(config: Config) -> Self {
        let mut net = Network::new(Arc::new(config));
        net.set_clock(Some(START));
        Self {
            net,
            registry: Registry::new(),
        }
    }

    pub fn set_clock(&mut self, now: i64) {
        self.net.set_clock(Some(now));
    }

    /// Register a local client and discard its welcome burst.
    pub fn connect(&mut self, nick: &str) -> ConnId {
        let conn = self.net.add_conn("host.example", "192.0.2.1");
        self.send(conn, &format!("NICK {nick}"));
        self.send(conn, &format!("USER {nick} 0 * :{nick}"));
        let welcome = self.drain(conn);
        assert!(
            welcome.first().is_some_and(|l| l.contains(" 001 ")),
            "{nick} did not register: {welcome:?}"
        );
        conn
    }

    pub fn send(&mut self, conn: ConnId, line: &str) {
        self.registry.process(&mut self.net, conn, line);
    }

    /// Take everything queued on `conn`.
    pub fn drain(&mut self, conn: ConnId) -> Vec<String> {
        match self.net.conns.get_mut(&conn) {
            Some(c) => {
                let lines = c.sendq.lines();
                c.sendq.clear();
                lines
            }
            None => Vec::new(),
        }
    }

    pub fn client(&self, nick: &str) -> ClientId {
        self.net
            .find_nick(nick)
            .unwrap_or_else(|| panic!("{} does not know {nick}", self.net.name()))
    }

    pub fn channel(&self, name: &str) -> ChannelId {
        self.net
            .find_channel(name)
            .unwrap_or_else(|| panic!("{} has no {name}", self.net.name()))
    }

    pub fn channel_ts(&self, name: &str) -> i64 {
        self.net.channel(self.channel(name)).map_or(0, |c| c.ts)
    }

    pub fn flags(&self, chan: &str, nick: &str) -> Option<MemberFlags> {
        let chan = self.net.find_channel(chan)?;
        let client = self.net.find_nick(nick)?;
        self.net.member_flags(chan, client)
    }
}

/// `hub.mesh` (0HB) dialing `leaf.mesh` (1LF).
pub struct Mesh {
    pub hub: Node,
    pub leaf: Node,
    hub_side: ConnId,
    leaf_side: ConnId,
}

impl Mesh {
    pub fn new() -> Self {
        let mut hub = Config::new("hub.mesh", "0HB");
        hub.links.push(link_block("leaf.mesh", "1LF", 7000));
        let mut leaf = Config::new("leaf.mesh", "1LF");
        leaf.links.push(link_block("hub.mesh", "0HB", 7000));
        Self::from_configs(hub, leaf)
    }

    pub fn from_configs(hub: Config, leaf: Config) -> Self {
        let mut hub = Node::new(hub);
        let mut leaf = Node::new(leaf);
        let hub_side = hub.net.add_conn("127.0.0.1", "127.0.0.1");
        let leaf_side = leaf.net.add_conn("127.0.0.1", "127.0.0.1");
        Self {
            hub,
            leaf,
            hub_side,
            leaf_side,
        }
    }

    /// Run the handshake and both bursts to completion.
    pub fn link(&mut self) {
        assert!(self.hub.net.begin_outbound(self.hub_side, "leaf.mesh"));
        self.pump();
        assert_eq!(self.hub.net.links.len(), 1, "hub did not link");
        assert_eq!(self.leaf.net.links.len(), 1, "leaf did not link");
    }

    pub fn is_linked(&self) -> bool {
        !self.hub.net.links.is_empty() && !self.leaf.net.links.is_empty()
    }

    /// Deliver queued link traffic both ways until neither side has more.
    pub fn pump(&mut self) {
        for _ in 0..64 {
            let down = self.hub.drain(self.hub_side);
            let up = self.leaf.drain(self.leaf_side);
            if down.is_empty() && up.is_empty() {
                return;
            }
            for line in &down {
                self.leaf.send(self.leaf_side, line);
            }
            for line in &up {
                self.hub.send(self.hub_side, line);
            }
        }
        panic!("link traffic did not settle");
    }

    /// The hub's connection to the leaf.
    pub fn hub_side(&self) -> ConnId {
        self.hub_side
    }

    /// Lines the hub has queued for the leaf, without delivering them.
    pub fn peek_down(&self) -> Vec<String> {
        self.hub
            .net
            .conns
            .get(&self.hub_side)
            .map(|c| c.sendq.lines())
            .unwrap_or_default()
    }

    /// Drop the link as if the socket died on the hub's side.
    pub fn split(&mut self, reason: &str) {
        self.hub.net.connection_lost(self.hub_side, reason);
        self.leaf.net.connection_lost(self.leaf_side, reason);
    }
}

/// One leaf of a [`Star`] and the two ends of its link.
pub struct Spoke {
    pub node: Node,
    pub hub_side: ConnId,
    pub leaf_side: ConnId,
}

/// `hub.mesh` (0HB) dialing `a.mesh` (1AA) and `b.mesh` (2BB).
pub struct Star {
    pub hub: Node,
    pub a: Spoke,
    pub b: Spoke,
}

impl Star {
    pub fn new() -> Self {
        let mut hub = Config::new("hub.mesh", "0HB");
        hub.links.push(link_block("a.mesh", "1AA", 7000));
        hub.links.push(link_block("b.mesh", "2BB", 7000));
        let mut hub = Node::new(hub);
        let mut spoke = |name: &str, sid: &str| {
            let mut config = Config::new(name, sid);
            config.links.push(link_block("hub.mesh", "0HB", 7000));
            let mut node = Node::new(config);
            let leaf_side = node.net.add_conn("127.0.0.1", "127.0.0.1");
            Spoke {
                node,
                hub_side: hub.net.add_conn("127.0.0.1", "127.0.0.1"),
                leaf_side,
            }
        };
        let a = spoke("a.mesh", "1AA");
        let b = spoke("b.mesh", "2BB");
        Self { hub, a, b }
    }

    /// Handshake and burst with `a.mesh`, then with `b.mesh`.
    pub fn link(&mut self) {
        assert!(self.hub.net.begin_outbound(self.a.hub_side, "a.mesh"));
        self.pump();
        assert!(self.hub.net.begin_outbound(self.b.hub_side, "b.mesh"));
        self.pump();
        assert_eq!(self.hub.net.links.len(), 2, "hub did not link both leaves");
    }

    /// Hub's link to the leaf behind `spoke`.
    pub fn link_to(&self, spoke: &Spoke) -> LinkId {
        self.hub
            .net
            .link_by_conn(spoke.hub_side)
            .expect("leaf is linked")
    }

    /// Deliver what `a.mesh` has queued for the hub, and nothing else.
    pub fn deliver_up_from_a(&mut self) {
        for line in self.a.node.drain(self.a.leaf_side) {
            self.hub.send(self.a.hub_side, &line);
        }
    }

    /// Deliver queued link traffic on both spokes until everything settles.
    pub fn pump(&mut self) {
        for _ in 0..64 {
            let mut moved = false;
            for spoke in [&mut self.a, &mut self.b] {
                let down = self.hub.drain(spoke.hub_side);
                let up = spoke.node.drain(spoke.leaf_side);
                moved |= !down.is_empty() || !up.is_empty();
                for line in &down {
                    spoke.node.send(spoke.leaf_side, line);
                }
                for line in &up {
                    self.hub.send(spoke.hub_side, line);
                }
            }
            if !moved {
                return;
            }
        }
        panic!("link traffic did not settle");
    }
}

/// Start a daemon on an ephemeral localhost port.
pub async fn spawn_server(mut config: Config) -> SocketAddr {
    config.listen.address = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = Server::bind(Arc::new(config))
        .await
        .expect("bind test listener");
    let addr = server.local_addr().expect("listener address");
    tokio::spawn(server.run());
    addr
}

/// A line-oriented IRC client over TCP.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    pub nick: String,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            writer,
            nick: nick.to_string(),
        })
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        match timeout(dur, self.lines.next_line()).await?? {
            Some(line) => Ok(line),
            None => anyhow::bail!("connection closed"),
        }
    }

    /// Read until a line satisfies `predicate`, returning everything read.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let line = self.recv().await?;
            let done = predicate(&line);
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }

    /// NICK and USER, then wait for the ISUPPORT line that ends the welcome.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        let nick = self.nick.clone();
        self.send_raw(&format!("NICK {nick}")).await?;
        self.send_raw(&format!("USER {nick} 0 * :Test User {nick}")).await?;
        let welcome = self.recv_until(|l| l.contains(" 005 ")).await?;
        if !welcome[0].contains(" 001 ") {
            anyhow::bail!("registration failed: {welcome:?}");
        }
        Ok(())
    }

    pub async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("JOIN {channel}")).await
    }

    pub async fn privmsg(&mut self, target: &str, text: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("PRIVMSG {target} :{text}")).await
    }

    /// Wait for our own JOIN echo.
    pub async fn joined(&mut self, channel: &str) -> anyhow::Result<()> {
        let needle = format!(" JOIN {channel}");
        let prefix = format!(":{}!", self.nick);
        self.recv_until(|l| l.starts_with(&prefix) && l.ends_with(&needle))
            .await
            .map(|_| ())
    }
}
