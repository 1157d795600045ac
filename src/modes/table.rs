//! Letter to handler mapping.

use crate::state::{ChannelModes, ListKind, MODE_LETTERS, OperPrivs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeHandler {
    NoSuch,
    /// Plain flag, chanop to change.
    Simple(ChannelModes),
    /// Flag whose record only reaches peers with SERVICES.
    Service(ChannelModes),
    /// Flag reserved to operators holding the privilege.
    Staff(ChannelModes, OperPrivs),
    List(ListKind),
    Op,
    Voice,
    Limit,
    Key,
    Throttle,
    Forward,
}

/// Fixed 256-entry dispatch table, built once.
#[derive(Debug)]
pub struct ModeTable {
    handlers: [ModeHandler; 256],
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    pub fn new() -> Self {
        let handlers = std::array::from_fn(|i| Self::handler_for(char::from(i as u8)));
        Self { handlers }
    }

    fn handler_for(c: char) -> ModeHandler {
        match c {
            'b' | 'e' | 'I' | 'q' => ListKind::from_letter(c).map_or(ModeHandler::NoSuch, ModeHandler::List),
            'o' => ModeHandler::Op,
            'v' => ModeHandler::Voice,
            'l' => ModeHandler::Limit,
            'k' => ModeHandler::Key,
            'j' => ModeHandler::Throttle,
            'f' => ModeHandler::Forward,
            'L' => ModeHandler::Staff(ChannelModes::EXLIMIT, OperPrivs::RESV),
            'P' => ModeHandler::Staff(ChannelModes::PERMANENT, OperPrivs::ADMIN),
            'r' => ModeHandler::Service(ChannelModes::REGONLY),
            _ => ChannelModes::from_letter(c).map_or(ModeHandler::NoSuch, ModeHandler::Simple),
        }
    }

    pub fn get(&self, c: char) -> ModeHandler {
        u8::try_from(c).map_or(ModeHandler::NoSuch, |b| self.handlers[usize::from(b)])
    }

    /// `CHANMODES=` token for ISUPPORT.
    pub fn chanmodes(&self) -> String {
        let flags: String = MODE_LETTERS
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| {
                matches!(
                    self.get(*c),
                    ModeHandler::Simple(_) | ModeHandler::Service(_) | ModeHandler::Staff(..)
                )
            })
            .collect();
        format!("eIbq,k,flj,{flags}")
    }
}
