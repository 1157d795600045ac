//! Introducing state to peers: `UID` lines and the link burst.

use tracing::info;

use crate::propagate::{BUFSIZE, Caps, LinkId};
use crate::state::{Channel, Client, ClientId, ListKind, Network};

/// Pack space-separated tokens after `prefix` (which ends in `:`), starting
/// a new line whenever the next token would overflow the wire limit.
pub(super) fn pack_tokens<I>(prefix: &str, tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    let mut line = prefix.to_string();
    let mut pending = false;
    for token in tokens {
        if pending && line.len() + 1 + token.len() > BUFSIZE - 2 {
            out.push(std::mem::replace(&mut line, prefix.to_string()));
            pending = false;
        }
        if pending {
            line.push(' ');
        }
        line.push_str(&token);
        pending = true;
    }
    if pending {
        out.push(line);
    }
    out
}

impl Network {
    /// `:<sid> UID <nick> <hops> <ts> <umodes> <user> <host> <ip> <uid> :<gecos>`
    pub(crate) fn uid_line(&self, c: &Client) -> String {
        let sid = c.uid.get(..3).unwrap_or(self.sid());
        let hops = self.topology.get(sid).map_or(1, |s| s.hopcount + 1);
        format!(
            ":{sid} UID {} {hops} {} {} {} {} {} {} :{}",
            c.nick,
            c.ts,
            c.umodes.to_letters(),
            c.user,
            c.host,
            if c.ip.is_empty() { "0" } else { &c.ip },
            c.uid,
            c.realname
        )
    }

    /// Announce a client to every peer except `from`.
    pub fn introduce_client(&mut self, id: ClientId, from: Option<LinkId>) {
        let Some(line) = self.client(id).map(|c| self.uid_line(c)) else {
            return;
        };
        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6, Caps::empty(), &[line]);
    }

    fn sjoin_lines(&self, ch: &Channel, skip: LinkId) -> Vec<String> {
        let prefix = format!(":{} SJOIN {} {} {} :", self.sid(), ch.ts, ch.name, ch.mode_string(true));
        let mut members: Vec<(&ClientId, String)> = ch
            .members
            .iter()
            .filter_map(|(id, handle)| {
                let client = self.client(*id)?;
                if client.link() == Some(skip) {
                    return None;
                }
                let flags = self.membership(*handle)?.flags;
                Some((id, format!("{}{}", flags.prefixes(), client.uid)))
            })
            .collect();
        members.sort();
        pack_tokens(&prefix, members.into_iter().map(|(_, t)| t))
    }

    fn bmask_lines(&self, ch: &Channel, kind: ListKind) -> Vec<String> {
        let prefix = format!(":{} BMASK {} {} {} :", self.sid(), ch.ts, ch.name, kind.letter());
        pack_tokens(&prefix, ch.list(kind).iter().map(|e| e.mask.clone()))
    }

    /// Send our view of the network to a freshly linked peer: servers,
    /// clients, channels with their lists, then mode locks.
    pub fn send_burst(&mut self, link: LinkId) {
        let Some(caps) = self.links.get(&link).map(|l| l.caps) else {
            return;
        };
        let me = self.sid().to_string();
        let mut lines = Vec::new();

        for s in self.topology.remote_servers(&me) {
            if s.link == Some(link) {
                continue;
            }
            let via = s.via.as_deref().unwrap_or(&me);
            lines.push(format!(":{via} SID {} {} {} :{}", s.name, s.hopcount + 1, s.sid, s.info));
        }

        let mut clients: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| c.link() != Some(link))
            .collect();
        clients.sort_by_key(|c| c.id);
        lines.extend(clients.into_iter().map(|c| self.uid_line(c)));

        let mut channels: Vec<&Channel> = self
            .channels
            .values()
            .filter(|ch| !ch.is_local() && !ch.members.is_empty())
            .collect();
        channels.sort_by_key(|ch| ch.id);
        for ch in channels {
            lines.extend(self.sjoin_lines(ch, link));
            for kind in ListKind::ALL {
                let needs = match kind {
                    ListKind::Except => Caps::EX,
                    ListKind::Invex => Caps::IE,
                    _ => Caps::empty(),
                };
                if caps.contains(needs) {
                    lines.extend(self.bmask_lines(ch, kind));
                }
            }
            if caps.contains(Caps::MLOCK) && !ch.lock.is_empty() {
                lines.push(format!(":{me} MLOCK {} {} :{}", ch.ts, ch.name, ch.lock.raw));
            }
        }

        let count = lines.len();
        for line in &lines {
            if !self.send_to_link(link, line) {
                break;
            }
        }
        let name = self.links.get(&link).map(|l| l.name.clone()).unwrap_or_default();
        info!(server = %name, lines = count, "burst sent");
    }
}
