//! Flooding across the link tree.
//!
//! A [`Broadcast`] carries a fresh serial. Sending to a link stamps the
//! link with that serial, and any later attempt with the same broadcast
//! skips it, so one event reaches each peer at most once however many
//! local triggers relay it.

use super::{Caps, LinkId};
use crate::state::{ChannelId, Network};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    serial: u64,
    /// Link the event arrived on; never sent back there.
    except: Option<LinkId>,
}

impl Broadcast {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn origin(&self) -> Option<LinkId> {
        self.except
    }
}

impl Network {
    /// Start a new broadcast arriving from `from` (`None` for local events).
    pub fn broadcast(&mut self, from: Option<LinkId>) -> Broadcast {
        self.serial += 1;
        Broadcast {
            serial: self.serial,
            except: from,
        }
    }

    /// Send `lines` to one link unless it already has this broadcast.
    pub fn relay_to(&mut self, b: &Broadcast, link: LinkId, lines: &[String]) -> bool {
        if b.except == Some(link) {
            return false;
        }
        let Some(l) = self.links.get_mut(&link) else {
            return false;
        };
        if l.last_serial == b.serial {
            return false;
        }
        l.last_serial = b.serial;
        let conn = l.conn;
        for line in lines {
            if !self.send_to_conn(conn, line) {
                break;
            }
        }
        true
    }

    /// Send `lines` to every link with all of `required` and none of
    /// `forbidden`. Returns the number of links reached.
    pub fn relay(
        &mut self,
        b: &Broadcast,
        required: Caps,
        forbidden: Caps,
        lines: &[String],
    ) -> usize {
        let targets: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.accepts(required, forbidden))
            .map(|l| l.id)
            .collect();
        targets
            .into_iter()
            .filter(|link| self.relay_to(b, *link, lines))
            .count()
    }

    /// One copy of `line` per link that has a member of `chan` behind it.
    pub fn flood_channel_remote(&mut self, b: &Broadcast, chan: ChannelId, line: &str) -> usize {
        let Some(channel) = self.channels.get(&chan) else {
            return 0;
        };
        let mut links: Vec<LinkId> = channel
            .members
            .keys()
            .filter_map(|id| self.clients.get(id).and_then(|c| c.link()))
            .collect();
        links.sort();
        links.dedup();
        let lines = [line.to_string()];
        links
            .into_iter()
            .filter(|link| self.relay_to(b, *link, &lines))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;

    fn hub() -> (Network, LinkId, LinkId) {
        let mut net = Network::new(Arc::new(Config::new("hub.mesh", "0HB")));
        let a = net.add_conn("a.mesh", "192.0.2.10");
        let b = net.add_conn("b.mesh", "192.0.2.11");
        let a = net.attach_link(a, "a.mesh", "0AA", Caps::TS6 | Caps::EX);
        let b = net.attach_link(b, "b.mesh", "0BB", Caps::TS6);
        (net, a, b)
    }

    fn queued(net: &Network, link: LinkId) -> Vec<String> {
        let conn = net.links[&link].conn;
        net.conns[&conn].sendq.lines()
    }

    #[test]
    fn relay_skips_origin_and_duplicates() {
        let (mut net, a, b) = hub();
        let lines = vec![":0AA TMODE 100 #a +n".to_string()];

        let bc = net.broadcast(Some(a));
        assert_eq!(net.relay(&bc, Caps::TS6, Caps::empty(), &lines), 1);
        // A second trigger in the same pass.
        assert_eq!(net.relay(&bc, Caps::TS6, Caps::empty(), &lines), 0);
        assert!(!net.relay_to(&bc, b, &lines));

        assert!(queued(&net, a).is_empty());
        assert_eq!(queued(&net, b), lines);
    }

    #[test]
    fn fresh_broadcast_reaches_everyone_again() {
        let (mut net, a, b) = hub();
        let lines = vec!["PING :x".to_string()];
        let first = net.broadcast(None);
        net.relay(&first, Caps::empty(), Caps::empty(), &lines);
        let second = net.broadcast(None);
        assert!(second.serial() > first.serial());
        net.relay(&second, Caps::empty(), Caps::empty(), &lines);
        assert_eq!(queued(&net, a).len(), 2);
        assert_eq!(queued(&net, b).len(), 2);
    }

    #[test]
    fn relay_filters_on_caps() {
        let (mut net, a, b) = hub();
        let bc = net.broadcast(None);
        let reached = net.relay(&bc, Caps::EX, Caps::empty(), &["x".to_string()]);
        assert_eq!(reached, 1);
        assert_eq!(queued(&net, a).len(), 1);
        assert!(queued(&net, b).is_empty());
    }
}
