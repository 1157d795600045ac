//! Core configuration types and loading.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::channel::ChannelConfig;
use super::limits::LimitsConfig;
use super::links::LinkBlock;
use super::oper::OperBlock;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Listener for both clients and servers.
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Channel feature toggles.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Operator blocks.
    #[serde(default)]
    pub oper: Vec<OperBlock>,
    /// Server link blocks, written as `[[link]]`.
    #[serde(default, rename = "link")]
    pub links: Vec<LinkBlock>,
}

impl Config {
    /// Configuration with every section at its default.
    pub fn new(name: &str, sid: &str) -> Self {
        Self {
            server: ServerConfig {
                name: name.to_string(),
                sid: sid.to_string(),
                description: default_description(),
                network: default_network(),
                metrics_port: None,
            },
            listen: ListenConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            channel: ChannelConfig::default(),
            oper: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find the link block for a server name.
    pub fn link(&self, name: &str) -> Option<&LinkBlock> {
        self.links
            .iter()
            .find(|l| meshirc_proto::irc_eq(&l.name, name))
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "hub.mesh.example").
    pub name: String,
    /// TS6 server id, `[0-9][A-Z0-9][A-Z0-9]`.
    pub sid: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_network")]
    pub network: String,
    /// Port for the Prometheus endpoint; disabled when unset.
    pub metrics_port: Option<u16>,
}

pub(super) fn default_true() -> bool {
    true
}

fn default_description() -> String {
    "meshircd".to_string()
}

fn default_network() -> String {
    "MeshNet".to_string()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6667))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
