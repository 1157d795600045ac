//! Resource limits.

use serde::Deserialize;

/// Per-channel and per-connection limits.
///
/// The mode caps bound how much work one MODE command can do; the sendq
/// ceilings bound how much output may pile up for a slow reader before the
/// connection is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Entries allowed across all four list modes of one channel.
    #[serde(default = "default_max_bans")]
    pub max_bans: usize,
    /// Same, for channels with `+L`.
    #[serde(default = "default_max_bans_large")]
    pub max_bans_large: usize,
    /// Argument-consuming letters accepted per command from a local client.
    /// Servers are not capped.
    #[serde(default = "default_max_mode_params")]
    pub max_mode_params: usize,
    /// Argument-less letters accepted per command.
    #[serde(default = "default_max_modes_simple")]
    pub max_modes_simple: usize,
    /// Output queue ceiling for client connections, in bytes.
    #[serde(default = "default_sendq_client")]
    pub sendq_client: usize,
    /// Output queue ceiling for server links, in bytes.
    #[serde(default = "default_sendq_server")]
    pub sendq_server: usize,
    /// Chunks buffered between the event loop and a connection's writer.
    #[serde(default = "default_writer_capacity")]
    pub writer_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bans: default_max_bans(),
            max_bans_large: default_max_bans_large(),
            max_mode_params: default_max_mode_params(),
            max_modes_simple: default_max_modes_simple(),
            sendq_client: default_sendq_client(),
            sendq_server: default_sendq_server(),
            writer_capacity: default_writer_capacity(),
        }
    }
}

fn default_max_bans() -> usize {
    100
}

fn default_max_bans_large() -> usize {
    500
}

fn default_max_mode_params() -> usize {
    4
}

fn default_max_modes_simple() -> usize {
    46
}

fn default_sendq_client() -> usize {
    1024 * 1024
}

fn default_sendq_server() -> usize {
    8 * 1024 * 1024
}

fn default_writer_capacity() -> usize {
    64
}
