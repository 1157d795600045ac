//! # meshirc-proto
//!
//! Wire-level helpers shared by the meshircd daemon:
//!
//! - [`casemap`]: rfc1459 case folding for nick and channel keys
//! - [`mask`]: glob, mask-subsumption and CIDR matching for ban masks
//! - [`line`]: a zero-copy line parser for client and server traffic

#![deny(clippy::all)]

pub mod casemap;
pub mod error;
pub mod line;
pub mod mask;

pub use casemap::{irc_eq, irc_lower_char, irc_to_lower};
pub use error::ParseError;
pub use line::Line;
pub use mask::{collapse, mask_match, match_cidr, wildcard_match};
