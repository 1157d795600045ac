//! Operator block configuration.

use serde::Deserialize;

/// Operator block.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    /// Name given to OPER.
    pub name: String,
    /// Password (plaintext or bcrypt hash).
    pub password: String,
    /// Optional `nick!user@host` restriction.
    pub hostmask: Option<String>,
    /// Granted privileges: `admin`, `resv`.
    #[serde(default)]
    pub privileges: Vec<String>,
}

impl OperBlock {
    /// Verify the provided password against the stored password (plaintext or bcrypt).
    pub fn verify_password(&self, password: &str) -> bool {
        if self.password.starts_with("$2") {
            bcrypt::verify(password, &self.password).unwrap_or(false)
        } else {
            self.password == password
        }
    }
}
