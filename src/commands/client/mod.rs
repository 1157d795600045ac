//! Commands from registered local clients.

mod channel;
mod connection;
mod message;
mod mode;
mod oper;

pub use channel::{JoinHandler, KickHandler, PartHandler};
pub use connection::{NickHandler, PingHandler, PongHandler, QuitHandler, ReregisterHandler};
pub use message::{NoticeHandler, PrivmsgHandler};
pub use mode::{MlockHandler, ModeHandler};
pub use oper::OperHandler;

use crate::error::CommandError;
use crate::state::{ClientId, Network};

/// Reply with an error without aborting the rest of a multi-target command.
pub(super) fn send_error(net: &mut Network, client: ClientId, command: &str, err: CommandError) {
    let nick = net.client(client).map(|c| c.nick.clone()).unwrap_or_default();
    if let Some(reply) = err.to_reply(net.name(), &nick, command) {
        net.send_to_client(client, &reply);
    }
}

/// Nick and hostmask of a client, for reply targets and line prefixes.
pub(super) fn identity(net: &Network, id: ClientId) -> Option<(String, String)> {
    net.client(id).map(|c| (c.nick.clone(), c.hostmask()))
}

/// Split a comma-separated target list, skipping empty entries.
pub(super) fn targets(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|t| !t.is_empty())
}
