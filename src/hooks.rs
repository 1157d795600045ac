//! Collaborator hooks for join, kick and channel access decisions.
//!
//! Hooks run in registration order. Each sees the verdict so far and may
//! overwrite it, so a later hook can both deny and re-allow.

use std::fmt;
use std::sync::Arc;

use crate::error::JoinError;
use crate::modes::AccessLevel;
use crate::state::{ChannelId, ClientId, Network};

/// Observes a local join after the built-in admission checks.
pub trait JoinHook: Send + Sync {
    fn on_join(
        &self,
        net: &Network,
        client: ClientId,
        chan: ChannelId,
        verdict: &mut Result<(), JoinError>,
    );
}

/// Observes a kick issued by a local client. An `Err` carries the notice
/// shown to the kicker.
pub trait KickHook: Send + Sync {
    fn on_kick(
        &self,
        net: &Network,
        source: ClientId,
        target: ClientId,
        chan: ChannelId,
        verdict: &mut Result<(), String>,
    );
}

/// Adjusts the access level a local client holds on a channel.
pub trait AccessHook: Send + Sync {
    fn adjust(&self, net: &Network, client: ClientId, chan: ChannelId, level: &mut AccessLevel);
}

#[derive(Clone, Default)]
pub struct Hooks {
    pub join: Vec<Arc<dyn JoinHook>>,
    pub kick: Vec<Arc<dyn KickHook>>,
    pub access: Vec<Arc<dyn AccessHook>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("join", &self.join.len())
            .field("kick", &self.kick.len())
            .field("access", &self.access.len())
            .finish()
    }
}

impl Network {
    pub(crate) fn run_join_hooks(
        &self,
        client: ClientId,
        chan: ChannelId,
        mut verdict: Result<(), JoinError>,
    ) -> Result<(), JoinError> {
        for hook in &self.hooks.join {
            hook.on_join(self, client, chan, &mut verdict);
        }
        verdict
    }

    pub(crate) fn run_kick_hooks(
        &self,
        source: ClientId,
        target: ClientId,
        chan: ChannelId,
    ) -> Result<(), String> {
        let mut verdict = Ok(());
        for hook in &self.hooks.kick {
            hook.on_kick(self, source, target, chan, &mut verdict);
        }
        verdict
    }

    pub(crate) fn run_access_hooks(&self, client: ClientId, chan: ChannelId, mut level: AccessLevel) -> AccessLevel {
        for hook in &self.hooks.access {
            hook.adjust(self, client, chan, &mut level);
        }
        level
    }
}
