//! Channel feature toggles.

use serde::Deserialize;

use super::types::default_true;

/// Switches for channel features that peers may or may not share.
///
/// Disabling `use_except` or `use_invex` stops local clients from adding
/// entries, but removals from any source are still honored so the list
/// stays consistent with servers that have the feature on.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Ban exceptions (`+e`).
    #[serde(default = "default_true")]
    pub use_except: bool,
    /// Invite exceptions (`+I`).
    #[serde(default = "default_true")]
    pub use_invex: bool,
    /// Channel forwarding (`+f`).
    #[serde(default = "default_true")]
    pub use_forward: bool,
    /// Longest accepted channel key.
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            use_except: true,
            use_invex: true,
            use_forward: true,
            max_key_len: default_max_key_len(),
        }
    }
}

fn default_max_key_len() -> usize {
    23
}
