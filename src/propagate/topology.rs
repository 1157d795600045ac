//! The spanning tree of known servers.
//!
//! Each server remembers the SID that introduced it and the direct link it
//! is reached through. Removing a link removes everything downstream.

use std::collections::{HashMap, HashSet};

use meshirc_proto::irc_eq;

use super::LinkId;

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub sid: String,
    pub name: String,
    pub info: String,
    pub hopcount: u32,
    /// Uplink SID; `None` only for ourselves.
    pub via: Option<String>,
    /// Direct link this server is reached through; `None` only for ourselves.
    pub link: Option<LinkId>,
}

#[derive(Debug, Default)]
pub struct Topology {
    servers: HashMap<String, ServerInfo>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_server(&mut self, info: ServerInfo) {
        self.servers.insert(info.sid.clone(), info);
    }

    pub fn get(&self, sid: &str) -> Option<&ServerInfo> {
        self.servers.get(sid)
    }

    pub fn by_name(&self, name: &str) -> Option<&ServerInfo> {
        self.servers.values().find(|s| irc_eq(&s.name, name))
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.servers.contains_key(sid)
    }

    /// Direct link a server is routed through.
    pub fn route(&self, sid: &str) -> Option<LinkId> {
        self.servers.get(sid).and_then(|s| s.link)
    }

    /// `sid` and every server that routes through it.
    pub fn downstream(&self, sid: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut to_process = vec![sid.to_string()];
        let mut processed = HashSet::new();

        while let Some(current) = to_process.pop() {
            if !processed.insert(current.clone()) {
                continue;
            }
            for info in self.servers.values() {
                if info.via.as_deref() == Some(current.as_str()) && !processed.contains(&info.sid) {
                    to_process.push(info.sid.clone());
                }
            }
            result.push(current);
        }

        result
    }

    pub fn remove_servers(&mut self, sids: &[String]) {
        for sid in sids {
            self.servers.remove(sid);
        }
    }

    /// Remote servers, parents before children.
    pub fn remote_servers(&self, root: &str) -> Vec<&ServerInfo> {
        let mut ordered = Vec::new();
        let mut frontier = vec![root.to_string()];
        while let Some(parent) = frontier.pop() {
            let mut children: Vec<&ServerInfo> = self
                .servers
                .values()
                .filter(|s| s.via.as_deref() == Some(parent.as_str()))
                .collect();
            children.sort_by(|a, b| a.sid.cmp(&b.sid));
            for child in children {
                frontier.push(child.sid.clone());
                ordered.push(child);
            }
        }
        ordered
    }
}
