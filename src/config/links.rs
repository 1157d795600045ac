//! Server-to-server link configuration.

use serde::Deserialize;

/// Link block for one peer server.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name (e.g., "leaf.mesh.example").
    pub name: String,
    /// Address to connect to when we initiate.
    pub hostname: String,
    pub port: u16,
    /// Shared secret sent in both directions of the handshake.
    pub password: String,
    /// Expected remote SID; any SID is accepted when unset.
    pub sid: Option<String>,
    /// Connect to this server at startup.
    #[serde(default)]
    pub autoconnect: bool,
    /// Output queue ceiling override for this link, in bytes.
    pub sendq: Option<usize>,
}
