//! Configuration loading and management.
//!
//! - [`types`]: top-level [`Config`], server identity, listener and logging
//! - [`limits`]: per-channel and per-connection resource limits
//! - [`channel`]: channel feature toggles
//! - [`oper`]: operator blocks
//! - [`links`]: server-to-server link blocks
//! - [`validation`]: startup checks

mod channel;
mod limits;
mod links;
mod oper;
mod types;
mod validation;

pub use channel::ChannelConfig;
pub use limits::LimitsConfig;
pub use links::LinkBlock;
pub use oper::OperBlock;
pub use types::{Config, ConfigError, ListenConfig, LogFormat, LoggingConfig, ServerConfig};
pub use validation::{ValidationError, validate};
