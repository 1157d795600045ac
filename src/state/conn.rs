//! Connections as seen by the core: an output queue plus a role.

use std::fmt;

use super::client::ClientId;
use crate::propagate::{Caps, LinkId, SendQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Handshake state collected before a connection becomes a client or a link.
#[derive(Debug, Default)]
pub struct Registration {
    pub nick: Option<String>,
    pub user: Option<String>,
    pub realname: Option<String>,
    /// `PASS <password> TS 6 :<sid>`
    pub pass: Option<String>,
    pub ts6_sid: Option<String>,
    pub caps: Option<Caps>,
    /// Set when we dialed out to this link block.
    pub outbound: Option<String>,
}

#[derive(Debug)]
pub enum Role {
    Unregistered(Registration),
    Client(ClientId),
    Server(LinkId),
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub host: String,
    pub ip: String,
    pub role: Role,
    pub sendq: SendQueue,
    /// Reason the connection is being torn down, once dead.
    pub dead: Option<String>,
}

impl Connection {
    pub fn is_dead(&self) -> bool {
        self.dead.is_some()
    }
}
