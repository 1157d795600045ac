//! Directly connected peer servers.

use std::fmt;

use super::Caps;
use crate::state::ConnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub sid: String,
    pub caps: Caps,
    pub conn: ConnId,
    /// Serial of the last broadcast this link received.
    pub last_serial: u64,
}

impl Link {
    /// Has every capability in `required` and none in `forbidden`.
    pub fn accepts(&self, required: Caps, forbidden: Caps) -> bool {
        self.caps.contains(required) && !self.caps.intersects(forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_checks_both_masks() {
        let link = Link {
            id: LinkId(1),
            name: "leaf.mesh".into(),
            sid: "0LF".into(),
            caps: Caps::TS6 | Caps::EX,
            conn: ConnId(1),
            last_serial: 0,
        };
        assert!(link.accepts(Caps::TS6, Caps::empty()));
        assert!(link.accepts(Caps::TS6 | Caps::EX, Caps::IE));
        assert!(!link.accepts(Caps::IE, Caps::empty()));
        assert!(!link.accepts(Caps::empty(), Caps::EX));
    }
}
