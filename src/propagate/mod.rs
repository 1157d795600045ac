//! Getting lines out: per-connection queues, links, fan-out and the mode
//! batch compiler.
//!
//! Every send goes through [`Network::send_to_conn`], which enforces the
//! sendq ceiling. A connection that overflows is marked dead on the spot
//! and reaped after the current command.

mod caps;
mod compile;
mod fanout;
mod link;
mod sendq;
mod topology;

pub use caps::{CHANNEL_CAPS, CapCombo, CapCombos, Caps, NCHCAP_COMBOS};
pub use compile::{BUFSIZE, LocalLines, MAXMODEPARAMSSERV, MODEBUFLEN, render_local, render_remote};
pub use fanout::Broadcast;
pub use link::{Link, LinkId};
pub use sendq::{SendQExceeded, SendQueue};
pub use topology::{ServerInfo, Topology};

use tracing::{info, warn};

use crate::metrics;
use crate::state::{ChannelId, ClientId, ConnId, Network, Role};

/// Which local members of a channel receive a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    AllMembers,
    ChanOps,
}

impl Network {
    /// Queue one line on a connection. Returns false if it was not queued.
    pub fn send_to_conn(&mut self, conn: ConnId, line: &str) -> bool {
        let Some(c) = self.conns.get_mut(&conn) else {
            return false;
        };
        if c.is_dead() {
            return false;
        }
        match c.sendq.push_line(line) {
            Ok(()) => {
                self.mark_dirty(conn);
                true
            }
            Err(over) => {
                self.sendq_exceeded(conn, over);
                false
            }
        }
    }

    fn sendq_exceeded(&mut self, conn: ConnId, over: SendQExceeded) {
        let Some(c) = self.conns.get_mut(&conn) else {
            return;
        };
        c.dead = Some("Max SendQ exceeded".to_string());
        c.sendq.clear();
        let link = match c.role {
            Role::Server(link) => Some(link),
            _ => None,
        };
        self.dead.push(conn);
        metrics::record_sendq_drop();

        match link {
            Some(link) => {
                let name = self
                    .links
                    .get(&link)
                    .map(|l| l.name.clone())
                    .unwrap_or_default();
                warn!(server = %name, queued = over.queued, max = over.ceiling, "Max SendQ limit exceeded");
                self.notice_opers(&format!(
                    "Max SendQ limit exceeded for {}: {} > {}",
                    name, over.queued, over.ceiling
                ));
            }
            None => {
                warn!(%conn, queued = over.queued, max = over.ceiling, "Max SendQ limit exceeded");
            }
        }
    }

    /// Send to a client, locally or towards the link it sits behind.
    pub fn send_to_client(&mut self, client: ClientId, line: &str) -> bool {
        let Some(c) = self.clients.get(&client) else {
            return false;
        };
        match (c.conn(), c.link()) {
            (Some(conn), _) => self.send_to_conn(conn, line),
            (_, Some(link)) => self.send_to_link(link, line),
            _ => false,
        }
    }

    pub fn send_to_link(&mut self, link: LinkId, line: &str) -> bool {
        match self.links.get(&link).map(|l| l.conn) {
            Some(conn) => self.send_to_conn(conn, line),
            None => false,
        }
    }

    /// `*** Notice --` to every local operator.
    pub fn notice_opers(&mut self, text: &str) {
        let me = self.name().to_string();
        for oper in self.local_opers() {
            let Some(nick) = self.clients.get(&oper).map(|c| c.nick.clone()) else {
                continue;
            };
            self.send_to_client(oper, &format!(":{me} NOTICE {nick} :*** Notice -- {text}"));
        }
    }

    /// Queue a line for the local members of a channel.
    pub fn send_to_channel_local(
        &mut self,
        chan: ChannelId,
        audience: Audience,
        except: Option<ClientId>,
        line: &str,
    ) {
        let Some(channel) = self.channels.get(&chan) else {
            return;
        };
        let targets: Vec<ConnId> = channel
            .members
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .filter(|(_, handle)| match audience {
                Audience::AllMembers => true,
                Audience::ChanOps => self
                    .members
                    .get(**handle)
                    .is_some_and(|m| m.is_chanop()),
            })
            .filter_map(|(id, _)| self.clients.get(id).and_then(|c| c.conn()))
            .collect();
        for conn in targets {
            self.send_to_conn(conn, line);
        }
    }

    /// One copy of `line` to every local client sharing a channel with
    /// `client`, not counting `client` itself.
    pub fn send_to_common_channels(&mut self, client: ClientId, line: &str) {
        let Some(c) = self.clients.get(&client) else {
            return;
        };
        let mut targets: Vec<ConnId> = c
            .channels
            .keys()
            .filter_map(|chan| self.channels.get(chan))
            .flat_map(|ch| ch.members.keys())
            .filter(|id| **id != client)
            .filter_map(|id| self.clients.get(id).and_then(|m| m.conn()))
            .collect();
        targets.sort();
        targets.dedup();
        for conn in targets {
            self.send_to_conn(conn, line);
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Promote a connection to a server link.
    pub fn attach_link(&mut self, conn: ConnId, name: &str, sid: &str, caps: Caps) -> LinkId {
        let id = self.next_link_id();
        let ceiling = self
            .config
            .link(name)
            .and_then(|l| l.sendq)
            .unwrap_or(self.config.limits.sendq_server);
        if let Some(c) = self.conns.get_mut(&conn) {
            c.role = Role::Server(id);
            c.sendq.set_ceiling(ceiling);
        }
        self.links.insert(
            id,
            Link {
                id,
                name: name.to_string(),
                sid: sid.to_string(),
                caps,
                conn,
                last_serial: 0,
            },
        );
        self.combos.attach(caps);
        metrics::set_links_active(self.links.len());
        info!(server = %name, %sid, caps = %caps.to_tokens(), "link established");
        id
    }

    /// Forget a link. Servers and clients behind it are the caller's job.
    pub fn detach_link(&mut self, link: LinkId) -> Option<Link> {
        let removed = self.links.remove(&link)?;
        self.combos = CapCombos::rebuild(self.links.values().map(|l| l.caps));
        metrics::set_links_active(self.links.len());
        info!(server = %removed.name, "link closed");
        Some(removed)
    }

    pub fn link_by_conn(&self, conn: ConnId) -> Option<LinkId> {
        match self.conns.get(&conn)?.role {
            Role::Server(link) => Some(link),
            _ => None,
        }
    }
}
