//! Prometheus metrics for meshircd.
//!
//! Everything lives in a private registry so tests and embedders can call
//! [`init`] freely. Recording before `init` is a silent no-op.
//!
//! - `irc_commands_total{command}` - commands processed by type
//! - `irc_mode_changes_total{mode}` - channel mode changes applied
//! - `irc_sendq_drops_total` - connections dropped for exceeding their sendq
//! - `irc_links_active` - directly connected servers
//! - `irc_bans_checked_total` - ban list evaluations that were not cached

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Commands processed by type (MODE, JOIN, SJOIN, ...).
pub static COMMANDS: OnceLock<IntCounterVec> = OnceLock::new();

/// Mode changes by letter.
pub static MODE_CHANGES: OnceLock<IntCounterVec> = OnceLock::new();

/// Connections torn down because their output queue overflowed.
pub static SENDQ_DROPS: OnceLock<IntCounter> = OnceLock::new();

/// Full ban list evaluations.
pub static BANS_CHECKED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static LINKS_ACTIVE: OnceLock<IntGauge> = OnceLock::new();

/// Register every metric. Safe to call more than once.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                    }
                }
            }
        };
    }

    register!(COMMANDS, IntCounterVec::new(Opts::new("irc_commands_total", "Commands processed by type"), &["command"]));
    register!(MODE_CHANGES, IntCounterVec::new(Opts::new("irc_mode_changes_total", "Channel mode changes"), &["mode"]));
    register!(SENDQ_DROPS, IntCounter::new("irc_sendq_drops_total", "Connections dropped for sendq overflow"));
    register!(BANS_CHECKED, IntCounter::new("irc_bans_checked_total", "Uncached ban list evaluations"));
    register!(LINKS_ACTIVE, IntGauge::new("irc_links_active", "Directly connected servers"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

#[inline]
pub fn record_command(command: &str) {
    if let Some(c) = COMMANDS.get() {
        c.with_label_values(&[command]).inc();
    }
}

#[inline]
pub fn record_mode_change(mode: char) {
    if let Some(c) = MODE_CHANGES.get() {
        c.with_label_values(&[&mode.to_string()]).inc();
    }
}

#[inline]
pub fn record_sendq_drop() {
    if let Some(c) = SENDQ_DROPS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_ban_check() {
    if let Some(c) = BANS_CHECKED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_links_active(count: usize) {
    if let Some(g) = LINKS_ACTIVE.get() {
        g.set(count as i64);
    }
}
