//! In-memory network state.
//!
//! [`Network`] owns every client, channel, membership, connection and link.
//! A single event loop holds it and runs each command to completion, so
//! nothing here is shared or locked.

mod arena;
mod channel;
mod client;
mod conn;
mod lists;
mod membership;
mod uid;

pub use arena::{Arena, Handle};
pub use channel::{
    Channel, ChannelId, ChannelModes, MODE_LETTERS, ModeLock, ModeParams, Throttle, Topic,
};
pub use client::{
    Client, ClientId, NICK_CHASE_WINDOW, NickHistory, OperPrivs, Origin, UserModes,
};
pub use conn::{ConnId, Connection, Registration, Role};
pub use lists::{BanList, ListEntry, ListKind};
pub use membership::{CachedVerdict, MemberFlags, Membership};
pub use uid::UidGenerator;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use meshirc_proto::irc_to_lower;
use tracing::debug;

use crate::bans::ExtbanRegistry;
use crate::config::Config;
use crate::hooks::Hooks;
use crate::modes::ModeTable;
use crate::propagate::{CapCombos, Link, LinkId, SendQueue, ServerInfo, Topology};

const NICK_HISTORY_LEN: usize = 256;
pub const MAX_CHANNEL_LEN: usize = 50;
pub const MAX_NICK_LEN: usize = 30;

/// `#` and `&` channels; no spaces, commas or BEL.
pub fn is_channel_name(name: &str) -> bool {
    (name.starts_with('#') || name.starts_with('&'))
        && name.len() > 1
        && name.len() <= MAX_CHANNEL_LEN
        && !name.contains([' ', ',', '\x07', ':'])
}

pub fn is_valid_nick(nick: &str) -> bool {
    let Some(first) = nick.chars().next() else {
        return false;
    };
    if first.is_ascii_digit() || first == '-' || nick.len() > MAX_NICK_LEN {
        return false;
    }
    nick.chars()
        .all(|c| c.is_ascii_alphanumeric() || "[]\\`_^{|}-".contains(c))
}

/// Identity of a client being introduced, local or remote.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub nick: String,
    pub user: String,
    pub host: String,
    pub ip: String,
    pub alt_host: Option<String>,
    pub realname: String,
    pub account: Option<String>,
    pub server: String,
    pub ts: i64,
    pub umodes: UserModes,
}

pub struct Network {
    pub config: Arc<Config>,
    /// Server start time.
    pub created: i64,

    pub clients: HashMap<ClientId, Client>,
    /// Folded nick to client.
    nicks: HashMap<String, ClientId>,
    uids: HashMap<String, ClientId>,
    pub history: NickHistory,

    pub channels: HashMap<ChannelId, Channel>,
    /// Folded name to channel.
    channel_names: HashMap<String, ChannelId>,
    pub members: Arena<Membership>,

    pub conns: HashMap<ConnId, Connection>,
    /// Ordered so relays walk links deterministically.
    pub links: BTreeMap<LinkId, Link>,
    pub topology: Topology,
    pub combos: CapCombos,
    /// Last broadcast serial handed out.
    pub(crate) serial: u64,

    pub modes: Arc<ModeTable>,
    pub extbans: ExtbanRegistry,
    pub hooks: Hooks,

    next_id: u64,
    uid_gen: UidGenerator,
    clock: Option<i64>,
    /// Connections that died during the current command.
    pub(crate) dead: Vec<ConnId>,
    /// Connections removed from state with their unsent output; the
    /// runtime flushes and closes them.
    closed: Vec<(ConnId, Option<Bytes>)>,
    /// Connections with newly queued output.
    dirty: BTreeSet<ConnId>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("server", &self.config.server.name)
            .field("clients", &self.clients.len())
            .field("channels", &self.channels.len())
            .field("links", &self.links.len())
            .finish_non_exhaustive()
    }
}

impl Network {
    pub fn new(config: Arc<Config>) -> Self {
        let sid = config.server.sid.clone();
        let mut topology = Topology::new();
        topology.add_server(ServerInfo {
            sid: sid.clone(),
            name: config.server.name.clone(),
            info: config.server.description.clone(),
            hopcount: 0,
            via: None,
            link: None,
        });

        Self {
            created: chrono::Utc::now().timestamp(),
            clients: HashMap::new(),
            nicks: HashMap::new(),
            uids: HashMap::new(),
            history: NickHistory::new(NICK_HISTORY_LEN),
            channels: HashMap::new(),
            channel_names: HashMap::new(),
            members: Arena::new(),
            conns: HashMap::new(),
            links: BTreeMap::new(),
            topology,
            combos: CapCombos::new(),
            serial: 0,
            modes: Arc::new(ModeTable::new()),
            extbans: ExtbanRegistry::with_builtins(),
            hooks: Hooks::default(),
            next_id: 1,
            uid_gen: UidGenerator::new(sid),
            clock: None,
            dead: Vec::new(),
            closed: Vec::new(),
            dirty: BTreeSet::new(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    pub fn sid(&self) -> &str {
        &self.config.server.sid
    }

    pub fn now(&self) -> i64 {
        self.clock
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }

    /// Freeze the clock; `None` returns to wall time.
    pub fn set_clock(&mut self, now: Option<i64>) {
        self.clock = now;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ========================================================================
    // Connections
    // ========================================================================

    pub fn add_conn(&mut self, host: &str, ip: &str) -> ConnId {
        let id = ConnId(self.next_id());
        self.conns.insert(
            id,
            Connection {
                id,
                host: host.to_string(),
                ip: ip.to_string(),
                role: Role::Unregistered(Registration::default()),
                sendq: SendQueue::new(self.config.limits.sendq_client),
                dead: None,
            },
        );
        id
    }

    /// Forget a connection and hand it to the runtime for closing.
    pub(crate) fn drop_conn(&mut self, conn: ConnId) {
        if let Some(mut c) = self.conns.remove(&conn) {
            self.dirty.remove(&conn);
            self.closed.push((conn, c.sendq.take()));
        }
    }

    pub fn take_closed(&mut self) -> Vec<(ConnId, Option<Bytes>)> {
        std::mem::take(&mut self.closed)
    }

    pub(crate) fn mark_dirty(&mut self, conn: ConnId) {
        self.dirty.insert(conn);
    }

    /// Connections that gained output since the last call.
    pub fn take_dirty(&mut self) -> Vec<ConnId> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub(crate) fn next_link_id(&mut self) -> LinkId {
        LinkId(self.next_id())
    }

    // ========================================================================
    // Clients
    // ========================================================================

    pub fn generate_uid(&mut self) -> String {
        self.uid_gen.next_uid()
    }

    pub fn find_nick(&self, nick: &str) -> Option<ClientId> {
        self.nicks.get(&irc_to_lower(nick)).copied()
    }

    pub fn find_uid(&self, uid: &str) -> Option<ClientId> {
        self.uids.get(uid).copied()
    }

    /// Resolve a UID or a nick, the way server commands name clients.
    pub fn find_client(&self, name: &str) -> Option<ClientId> {
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            self.find_uid(name)
        } else {
            self.find_nick(name)
        }
    }

    /// Current owner of `nick`, or whoever held it within the chase window.
    pub fn chase_nick(&self, nick: &str) -> Option<ClientId> {
        self.find_nick(nick)
            .or_else(|| self.history.resolve(nick, self.now()))
            .filter(|id| self.clients.contains_key(id))
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn add_client(&mut self, uid: String, info: ClientInfo, origin: Origin) -> ClientId {
        let id = ClientId(self.next_id());
        self.nicks.insert(irc_to_lower(&info.nick), id);
        self.uids.insert(uid.clone(), id);
        self.clients.insert(
            id,
            Client {
                id,
                uid,
                nick: info.nick,
                user: info.user,
                host: info.host,
                ip: info.ip,
                alt_host: info.alt_host,
                realname: info.realname,
                account: info.account,
                server: info.server,
                ts: info.ts,
                umodes: info.umodes,
                privs: OperPrivs::empty(),
                origin,
                channels: HashMap::new(),
                invites: HashSet::new(),
            },
        );
        id
    }

    /// Rename a client. Cached ban verdicts for its memberships are dropped.
    pub fn change_nick(&mut self, id: ClientId, nick: &str, ts: i64) {
        let now = self.now();
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        let old = std::mem::replace(&mut client.nick, nick.to_string());
        client.ts = ts;
        self.nicks.remove(&irc_to_lower(&old));
        self.nicks.insert(irc_to_lower(nick), id);
        self.history.record(&old, id, now);
        self.invalidate_ban_cache(id);
    }

    /// Remove a client and every membership it holds.
    pub fn remove_client(&mut self, id: ClientId) -> Option<Client> {
        let channels: Vec<ChannelId> = self
            .clients
            .get(&id)
            .map(|c| c.channels.keys().copied().collect())
            .unwrap_or_default();
        for chan in channels {
            self.remove_member(chan, id);
        }
        let client = self.clients.remove(&id)?;
        if self.nicks.get(&irc_to_lower(&client.nick)) == Some(&id) {
            self.nicks.remove(&irc_to_lower(&client.nick));
        }
        self.uids.remove(&client.uid);
        Some(client)
    }

    /// Local operators, for server notices.
    pub fn local_opers(&self) -> Vec<ClientId> {
        self.clients
            .values()
            .filter(|c| c.is_local() && c.is_oper())
            .map(|c| c.id)
            .collect()
    }

    // ========================================================================
    // Channels
    // ========================================================================

    pub fn find_channel(&self, name: &str) -> Option<ChannelId> {
        self.channel_names.get(&irc_to_lower(name)).copied()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    /// Look up `name`, creating it with `ts` if missing. The flag is true
    /// when the channel was created.
    pub fn get_or_create_channel(&mut self, name: &str, ts: i64) -> (ChannelId, bool) {
        if let Some(id) = self.find_channel(name) {
            return (id, false);
        }
        let id = ChannelId(self.next_id());
        self.channel_names.insert(irc_to_lower(name), id);
        self.channels.insert(id, Channel::new(id, name, ts));
        debug!(channel = %name, ts, "channel created");
        (id, true)
    }

    /// Drop a channel and all memberships in it.
    pub fn destroy_channel(&mut self, id: ChannelId) {
        let Some(chan) = self.channels.remove(&id) else {
            return;
        };
        for (client, handle) in chan.members {
            if let Some(c) = self.clients.get_mut(&client) {
                c.channels.remove(&id);
            }
            self.members.remove(handle);
        }
        self.channel_names.remove(&irc_to_lower(&chan.name));
        debug!(channel = %chan.name, "channel destroyed");
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    /// Join `client` to `chan`. An existing membership is returned as is.
    pub fn add_member(
        &mut self,
        chan: ChannelId,
        client: ClientId,
        flags: MemberFlags,
    ) -> Option<Handle> {
        if let Some(handle) = self.find_membership(chan, client) {
            return Some(handle);
        }
        if !self.clients.contains_key(&client) {
            return None;
        }
        let channel = self.channels.get_mut(&chan)?;
        let handle = self.members.insert(Membership::new(chan, client, flags));
        channel.members.insert(client, handle);
        if let Some(c) = self.clients.get_mut(&client) {
            c.channels.insert(chan, handle);
            c.invites.remove(&chan);
        }
        Some(handle)
    }

    /// Remove a membership. An emptied channel is destroyed unless `+P`.
    pub fn remove_member(&mut self, chan: ChannelId, client: ClientId) -> bool {
        let Some(channel) = self.channels.get_mut(&chan) else {
            return false;
        };
        let Some(handle) = channel.members.remove(&client) else {
            return false;
        };
        let emptied =
            channel.members.is_empty() && !channel.modes.contains(ChannelModes::PERMANENT);
        if let Some(c) = self.clients.get_mut(&client) {
            c.channels.remove(&chan);
        }
        self.members.remove(handle);
        if emptied {
            self.destroy_channel(chan);
        }
        true
    }

    pub fn find_membership(&self, chan: ChannelId, client: ClientId) -> Option<Handle> {
        self.channels.get(&chan)?.members.get(&client).copied()
    }

    pub fn membership(&self, handle: Handle) -> Option<&Membership> {
        self.members.get(handle)
    }

    pub fn membership_mut(&mut self, handle: Handle) -> Option<&mut Membership> {
        self.members.get_mut(handle)
    }

    pub fn is_member(&self, chan: ChannelId, client: ClientId) -> bool {
        self.find_membership(chan, client).is_some()
    }

    /// Member flags, or `None` for non-members.
    pub fn member_flags(&self, chan: ChannelId, client: ClientId) -> Option<MemberFlags> {
        self.find_membership(chan, client)
            .and_then(|h| self.members.get(h))
            .map(|m| m.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network::new(Arc::new(Config::new("irc.mesh", "0ME")))
    }

    fn client(net: &mut Network, nick: &str) -> ClientId {
        let uid = net.generate_uid();
        let conn = net.add_conn("host.example", "192.0.2.1");
        net.add_client(
            uid,
            ClientInfo {
                nick: nick.into(),
                user: "u".into(),
                host: "host.example".into(),
                ip: "192.0.2.1".into(),
                server: "irc.mesh".into(),
                ..Default::default()
            },
            Origin::Local(conn),
        )
    }

    fn assert_symmetric(net: &Network) {
        for chan in net.channels.values() {
            for (client, handle) in &chan.members {
                assert_eq!(net.clients[client].channels.get(&chan.id), Some(handle));
            }
        }
        for c in net.clients.values() {
            for (chan, handle) in &c.channels {
                assert_eq!(net.channels[chan].members.get(&c.id), Some(handle));
            }
        }
        let total: usize = net.channels.values().map(|c| c.members.len()).sum();
        assert_eq!(total, net.members.len());
    }

    #[test]
    fn names_are_validated() {
        assert!(is_channel_name("#mesh"));
        assert!(is_channel_name("&local"));
        assert!(!is_channel_name("#"));
        assert!(!is_channel_name("#a,b"));
        assert!(!is_channel_name("mesh"));
        assert!(is_valid_nick("alice[1]"));
        assert!(!is_valid_nick("1alice"));
        assert!(!is_valid_nick("al ice"));
    }

    #[test]
    fn membership_is_symmetric() {
        let mut net = network();
        let alice = client(&mut net, "alice");
        let bob = client(&mut net, "bob");
        let (a, _) = net.get_or_create_channel("#a", 100);
        let (b, _) = net.get_or_create_channel("#b", 100);

        net.add_member(a, alice, MemberFlags::CHANOP);
        net.add_member(a, bob, MemberFlags::empty());
        net.add_member(b, bob, MemberFlags::empty());
        assert_symmetric(&net);

        assert!(net.remove_member(a, bob));
        assert!(!net.remove_member(a, bob));
        assert_symmetric(&net);

        net.remove_client(alice);
        assert!(net.find_channel("#a").is_none());
        assert_symmetric(&net);
        assert_eq!(net.members.len(), 1);
    }

    #[test]
    fn depopulated_channel_is_recreated_fresh() {
        let mut net = network();
        let alice = client(&mut net, "alice");
        let (first, created) = net.get_or_create_channel("#a", 100);
        assert!(created);
        net.add_member(first, alice, MemberFlags::CHANOP);
        net.remove_member(first, alice);

        let (second, created) = net.get_or_create_channel("#A", 200);
        assert!(created);
        assert_ne!(first, second);
        assert_eq!(net.channel(second).map(|c| c.ts), Some(200));
    }

    #[test]
    fn permanent_channel_survives_last_part() {
        let mut net = network();
        let alice = client(&mut net, "alice");
        let (chan, _) = net.get_or_create_channel("#keep", 100);
        net.channel_mut(chan).unwrap().modes |= ChannelModes::PERMANENT;
        net.add_member(chan, alice, MemberFlags::empty());
        net.remove_member(chan, alice);
        assert!(net.channel(chan).is_some());
    }

    #[test]
    fn nick_change_updates_index_and_history() {
        let mut net = network();
        net.set_clock(Some(1000));
        let alice = client(&mut net, "alice");
        net.change_nick(alice, "Alicia", 1000);
        assert_eq!(net.find_nick("alicia"), Some(alice));
        assert_eq!(net.find_nick("alice"), None);
        assert_eq!(net.chase_nick("alice"), Some(alice));
        net.set_clock(Some(1100));
        assert_eq!(net.chase_nick("alice"), None);
    }
}
