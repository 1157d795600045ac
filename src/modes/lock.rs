//! Server-enforced mode locks.

use tracing::debug;

use crate::propagate::{Caps, LinkId};
use crate::state::{ChannelId, ModeLock, Network};

impl Network {
    /// Replace the lock on `chan` and pass it on to MLOCK-capable peers.
    /// `source_id` is the SID or UID the lock is attributed to.
    pub fn set_mode_lock(&mut self, from: Option<LinkId>, source_id: &str, chan: ChannelId, raw: &str) {
        let Some(channel) = self.channel_mut(chan) else {
            return;
        };
        channel.lock = ModeLock::new(raw);
        let (name, ts, local) = (channel.name.clone(), channel.ts, channel.is_local());
        debug!(channel = %name, lock = %raw, "mode lock set");

        if local {
            return;
        }
        let line = format!(":{source_id} MLOCK {ts} {name} :{raw}");
        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6 | Caps::MLOCK, Caps::empty(), &[line]);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;

    #[test]
    fn lock_string_is_kept_verbatim() {
        let mut net = Network::new(Arc::new(Config::new("irc.mesh", "0ME")));
        let (chan, _) = net.get_or_create_channel("&local", 100);
        net.set_mode_lock(None, "0ME", chan, "+ntrLk-im+i");
        let lock = &net.channel(chan).unwrap().lock;
        assert_eq!(lock.raw, "+ntrLk-im+i");
        assert!(lock.locks('r') && lock.locks('L') && lock.locks('k') && lock.locks('m'));
        assert!(!lock.locks('s'));
    }

    #[test]
    fn lock_propagates_to_mlock_peers_only() {
        let mut net = Network::new(Arc::new(Config::new("irc.mesh", "0ME")));
        let a = net.add_conn("a.mesh", "192.0.2.10");
        let b = net.add_conn("b.mesh", "192.0.2.11");
        let with = net.attach_link(a, "a.mesh", "0AA", Caps::TS6 | Caps::MLOCK);
        let without = net.attach_link(b, "b.mesh", "0BB", Caps::TS6);
        let (chan, _) = net.get_or_create_channel("#a", 100);

        net.set_mode_lock(None, "0ME", chan, "+nt");
        assert_eq!(net.channel(chan).map(|c| c.lock.raw.as_str()), Some("+nt"));

        let queued = |net: &Network, link: LinkId| net.conns[&net.links[&link].conn].sendq.lines();
        assert_eq!(queued(&net, with), vec![":0ME MLOCK 100 #a :+nt"]);
        assert!(queued(&net, without).is_empty());
    }
}
