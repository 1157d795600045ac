//! Configuration validation.
//!
//! Catches identity and link mistakes before the listener starts.

use std::collections::HashSet;

use thiserror::Error;

use super::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must contain a '.', got '{0}'")]
    ServerNameNotDotted(String),
    #[error("server.sid must match pattern [0-9][A-Z0-9][A-Z0-9], got '{0}'")]
    InvalidSidFormat(String),
    #[error("link '{0}' has an invalid sid '{1}'")]
    InvalidLinkSid(String, String),
    #[error("link '{0}' is defined more than once")]
    DuplicateLink(String),
    #[error("limits.max_bans_large ({large}) is smaller than limits.max_bans ({normal})")]
    BanLimitsInverted { normal: usize, large: usize },
}

/// Whether `sid` is a well-formed TS6 server id.
pub fn is_valid_sid(sid: &str) -> bool {
    let b = sid.as_bytes();
    b.len() == 3
        && b[0].is_ascii_digit()
        && b[1..]
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    } else if !config.server.name.contains('.') {
        errors.push(ValidationError::ServerNameNotDotted(
            config.server.name.clone(),
        ));
    }

    if !is_valid_sid(&config.server.sid) {
        errors.push(ValidationError::InvalidSidFormat(config.server.sid.clone()));
    }

    let mut seen = HashSet::new();
    for link in &config.links {
        if !seen.insert(meshirc_proto::irc_to_lower(&link.name)) {
            errors.push(ValidationError::DuplicateLink(link.name.clone()));
        }
        if let Some(sid) = &link.sid
            && !is_valid_sid(sid)
        {
            errors.push(ValidationError::InvalidLinkSid(
                link.name.clone(),
                sid.clone(),
            ));
        }
    }

    if config.limits.max_bans_large < config.limits.max_bans {
        errors.push(ValidationError::BanLimitsInverted {
            normal: config.limits.max_bans,
            large: config.limits.max_bans_large,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
