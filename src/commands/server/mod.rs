//! Commands arriving on server links.
//!
//! Remote sources are trusted: admission, privilege and flood checks were
//! made by the server the source is attached to. What is checked here is
//! protocol shape and timestamps.

mod channel;
mod link;
mod message;
mod mode;
mod sjoin;
mod user;

pub use channel::{JoinHandler, KickHandler, PartHandler};
pub use link::{ErrorHandler, PingHandler, PongHandler, SidHandler, SquitHandler};
pub use message::MessageHandler;
pub use mode::{BmaskHandler, MlockHandler, TmodeHandler};
pub use sjoin::SjoinHandler;
pub use user::{KillHandler, NickHandler, QuitHandler, UidHandler, UmodeHandler};

use meshirc_proto::Line;

use crate::error::LinkError;
use crate::state::{ClientId, Network};

/// Require at least `n` parameters.
fn need(line: &Line<'_>, n: usize) -> Result<(), LinkError> {
    if line.params.len() < n {
        return Err(LinkError::Protocol(format!(
            "{} needs {n} parameters, got {}",
            line.command,
            line.params.len()
        )));
    }
    Ok(())
}

fn parse_ts(line: &Line<'_>, raw: &str) -> Result<i64, LinkError> {
    raw.parse()
        .map_err(|_| LinkError::Protocol(format!("{}: bad timestamp {raw:?}", line.command)))
}

/// The `:prefix` local clients see for a remote source: a client's
/// hostmask or a server's name.
fn display_prefix(net: &Network, source: &str) -> String {
    if let Some(c) = net.find_uid(source).and_then(|id| net.client(id)) {
        return c.hostmask();
    }
    net.topology
        .get(source)
        .map_or_else(|| source.to_string(), |s| s.name.clone())
}

fn source_client(net: &Network, source: &str) -> Option<ClientId> {
    net.find_uid(source)
}
