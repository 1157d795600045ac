//! Parse errors.

use thiserror::Error;

/// Reasons a raw line could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("invalid or missing command")]
    InvalidCommand,
    #[error("line contains a NUL byte")]
    InvalidCharacter,
}
