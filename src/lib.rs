//! meshircd: a TS6 IRC daemon core with replicated channel state.
//!
//! The [`state::Network`] holds everything and is owned by one event loop
//! ([`runtime`]). Commands are dispatched through [`commands::Registry`];
//! channel modes go through [`modes`], and all output leaves through the
//! queues and relays in [`propagate`].

pub mod bans;
pub mod commands;
pub mod config;
pub mod error;
pub mod hooks;
pub mod http;
pub mod metrics;
pub mod modes;
pub mod propagate;
pub mod replies;
pub mod runtime;
pub mod state;
