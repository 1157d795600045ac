//! NICK, PING, PONG and QUIT from registered clients.

use meshirc_proto::{Line, irc_eq};
use tracing::debug;

use super::super::ClientHandler;
use crate::error::{CommandError, CommandResult};
use crate::propagate::{Caps, LinkId};
use crate::state::{ClientId, Network, is_valid_nick};

impl Network {
    /// Rename a client everywhere: the client itself if local, local
    /// channel peers, then every link except `from`.
    pub(crate) fn rename_client(&mut self, id: ClientId, nick: &str, ts: i64, from: Option<LinkId>) {
        let Some((mask, uid, local)) = self
            .client(id)
            .map(|c| (c.hostmask(), c.uid.clone(), c.is_local()))
        else {
            return;
        };
        let line = format!(":{mask} NICK :{nick}");
        if local {
            self.send_to_client(id, &line);
        }
        self.send_to_common_channels(id, &line);
        self.change_nick(id, nick, ts);

        let b = self.broadcast(from);
        self.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} NICK {nick} :{ts}")]);
        debug!(%uid, %nick, "nick changed");
    }
}

pub struct NickHandler;

impl ClientHandler for NickHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let nick = line
            .param(0)
            .filter(|n| !n.is_empty())
            .ok_or(CommandError::NoNicknameGiven)?;
        if !is_valid_nick(nick) {
            return Err(CommandError::ErroneousNickname(nick.to_string()));
        }
        let current = net.client(client).map(|c| c.nick.clone()).unwrap_or_default();
        if current == nick {
            return Ok(());
        }
        // Case-only changes keep the nick's slot.
        if let Some(holder) = net.find_nick(nick)
            && (holder != client || !irc_eq(&current, nick))
        {
            return Err(CommandError::NicknameInUse(nick.to_string()));
        }
        let ts = net.now();
        net.rename_client(client, nick, ts, None);
        Ok(())
    }
}

/// USER and PASS after registration.
pub struct ReregisterHandler;

impl ClientHandler for ReregisterHandler {
    fn handle(&self, _net: &mut Network, _client: ClientId, _line: &Line<'_>) -> CommandResult {
        Err(CommandError::AlreadyRegistered)
    }
}

pub struct PingHandler;

impl ClientHandler for PingHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let token = line.param(0).ok_or(CommandError::NeedMoreParams)?;
        let me = net.name().to_string();
        net.send_to_client(client, &format!(":{me} PONG {me} :{token}"));
        Ok(())
    }
}

pub struct PongHandler;

impl ClientHandler for PongHandler {
    fn handle(&self, _net: &mut Network, _client: ClientId, _line: &Line<'_>) -> CommandResult {
        Ok(())
    }
}

pub struct QuitHandler;

impl ClientHandler for QuitHandler {
    fn handle(&self, _net: &mut Network, _client: ClientId, line: &Line<'_>) -> CommandResult {
        Err(CommandError::Quit(
            line.param(0).filter(|r| !r.is_empty()).map(str::to_string),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use crate::propagate::Caps;

    #[test]
    fn nick_change_reaches_self_peers_and_links() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        let (_, bob) = h.connect("bob");
        h.send(alice, "JOIN #a");
        h.send(bob, "JOIN #a");
        let link = h.link("leaf.mesh", "1LF", Caps::empty());
        h.drain(alice);
        h.drain(bob);

        h.send(alice, "NICK alicia");
        assert_eq!(h.drain(alice), vec![":alice!alice@host.example NICK :alicia"]);
        assert_eq!(h.drain(bob), vec![":alice!alice@host.example NICK :alicia"]);
        assert_eq!(h.drain_link(link), vec![":0HBAAAAAC NICK alicia :1000000"]);
        assert!(h.net.find_nick("alicia").is_some());
    }

    #[test]
    fn nick_in_use_and_case_change() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        h.connect("bob");
        h.send(alice, "NICK BOB");
        assert_eq!(h.drain(alice), vec![":hub.mesh 433 alice BOB :Nickname is already in use."]);
        h.send(alice, "NICK Alice");
        assert_eq!(h.drain(alice), vec![":alice!alice@host.example NICK :Alice"]);
    }

    #[test]
    fn reregistration_and_ping() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        h.send(alice, "USER a 0 * :again");
        h.send(alice, "PING :token");
        assert_eq!(
            h.drain(alice),
            vec![
                ":hub.mesh 462 alice :You may not reregister".to_string(),
                ":hub.mesh PONG hub.mesh :token".to_string(),
            ]
        );
    }

    #[test]
    fn quit_closes_the_connection() {
        let mut h = Harness::new();
        let (_, alice) = h.connect("alice");
        h.send(alice, "QUIT :gone fishing");
        assert!(h.net.find_nick("alice").is_none());
        let closed = h.net.take_closed();
        let text = String::from_utf8_lossy(closed[0].1.as_deref().unwrap_or_default()).to_string();
        assert!(text.contains("ERROR :Closing Link: host.example (Quit: gone fishing)"));
    }
}
