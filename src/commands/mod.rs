//! IRC command handlers.
//!
//! Lines arrive already framed. [`Registry::process`] parses one, routes it
//! by the role of the connection it came from (still registering, client,
//! or server link), runs the handler to completion and then reaps every
//! connection that died along the way.

mod burst;
pub(crate) mod client;
mod exit;
mod register;
mod server;

use std::collections::HashMap;

use meshirc_proto::Line;
use tracing::{debug, warn};

use crate::error::{CommandError, CommandResult, LinkError};
use crate::metrics;
use crate::propagate::LinkId;
use crate::state::{ClientId, ConnId, Network, Role};

pub use register::send_handshake;

/// Handler for a command from a registered local client.
pub trait ClientHandler: Send + Sync {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult;
}

/// Handler for a command arriving on a server link.
pub trait ServerHandler: Send + Sync {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError>;
}

/// Where a server command came from.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Link the line arrived on.
    pub link: LinkId,
    /// SID or UID from the prefix; the link's SID when there is none.
    pub source: String,
}

enum Route {
    Unregistered,
    Client(ClientId),
    Server(LinkId),
}

/// Registry of command handlers.
pub struct Registry {
    client: HashMap<&'static str, Box<dyn ClientHandler>>,
    server: HashMap<&'static str, Box<dyn ServerHandler>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut client: HashMap<&'static str, Box<dyn ClientHandler>> = HashMap::new();
        client.insert("NICK", Box::new(client::NickHandler));
        client.insert("USER", Box::new(client::ReregisterHandler));
        client.insert("PASS", Box::new(client::ReregisterHandler));
        client.insert("PING", Box::new(client::PingHandler));
        client.insert("PONG", Box::new(client::PongHandler));
        client.insert("QUIT", Box::new(client::QuitHandler));
        client.insert("JOIN", Box::new(client::JoinHandler));
        client.insert("PART", Box::new(client::PartHandler));
        client.insert("KICK", Box::new(client::KickHandler));
        client.insert("MODE", Box::new(client::ModeHandler));
        client.insert("MLOCK", Box::new(client::MlockHandler));
        client.insert("PRIVMSG", Box::new(client::PrivmsgHandler));
        client.insert("NOTICE", Box::new(client::NoticeHandler));
        client.insert("OPER", Box::new(client::OperHandler));

        let mut server: HashMap<&'static str, Box<dyn ServerHandler>> = HashMap::new();
        server.insert("PING", Box::new(server::PingHandler));
        server.insert("PONG", Box::new(server::PongHandler));
        server.insert("ERROR", Box::new(server::ErrorHandler));
        server.insert("SID", Box::new(server::SidHandler));
        server.insert("UID", Box::new(server::UidHandler));
        server.insert("NICK", Box::new(server::NickHandler));
        server.insert("QUIT", Box::new(server::QuitHandler));
        server.insert("KILL", Box::new(server::KillHandler));
        server.insert("SQUIT", Box::new(server::SquitHandler));
        server.insert("SJOIN", Box::new(server::SjoinHandler));
        server.insert("JOIN", Box::new(server::JoinHandler));
        server.insert("PART", Box::new(server::PartHandler));
        server.insert("KICK", Box::new(server::KickHandler));
        server.insert("MODE", Box::new(server::UmodeHandler));
        server.insert("TMODE", Box::new(server::TmodeHandler));
        server.insert("MLOCK", Box::new(server::MlockHandler));
        server.insert("BMASK", Box::new(server::BmaskHandler));
        server.insert("PRIVMSG", Box::new(server::MessageHandler));
        server.insert("NOTICE", Box::new(server::MessageHandler));

        Self { client, server }
    }

    /// Handle one line from `conn`, then reap whatever died.
    pub fn process(&self, net: &mut Network, conn: ConnId, raw: &str) {
        let line = match Line::parse(raw) {
            Ok(line) => line,
            Err(e) => {
                debug!(%conn, error = %e, "dropping unparseable line");
                return;
            }
        };
        let command = line.command.to_ascii_uppercase();
        metrics::record_command(&command);

        let route = match net.conns.get(&conn) {
            Some(c) if !c.is_dead() => match c.role {
                Role::Unregistered(_) => Route::Unregistered,
                Role::Client(id) => Route::Client(id),
                Role::Server(link) => Route::Server(link),
            },
            _ => return,
        };

        match route {
            Route::Unregistered => register::handle(net, conn, &command, &line),
            Route::Client(id) => self.client_command(net, id, &command, &line),
            Route::Server(link) => self.server_command(net, link, &command, &line),
        }
        net.reap_dead();
    }

    fn client_command(&self, net: &mut Network, id: ClientId, command: &str, line: &Line<'_>) {
        let result = match self.client.get(command) {
            Some(handler) => handler.handle(net, id, line),
            None => Err(CommandError::UnknownCommand(command.to_string())),
        };
        match result {
            Ok(()) => {}
            Err(CommandError::Quit(reason)) => {
                let reason = match reason {
                    Some(r) => format!("Quit: {r}"),
                    None => "Client Quit".to_string(),
                };
                net.exit_client(id, &reason, None);
            }
            Err(e) => {
                debug!(command, error = %e, code = e.error_code(), "command failed");
                let nick = net.client(id).map(|c| c.nick.clone()).unwrap_or_default();
                if let Some(reply) = e.to_reply(net.name(), &nick, command) {
                    net.send_to_client(id, &reply);
                }
            }
        }
    }

    fn server_command(&self, net: &mut Network, link: LinkId, command: &str, line: &Line<'_>) {
        let Some(sid) = net.links.get(&link).map(|l| l.sid.clone()) else {
            return;
        };
        let Some(handler) = self.server.get(command) else {
            debug!(command, %sid, "ignoring unknown server command");
            return;
        };
        let ctx = ServerContext {
            link,
            source: line.prefix.map_or(sid, str::to_string),
        };
        if let Err(e) = handler.handle(net, &ctx, line) {
            warn!(command, source = %ctx.source, error = %e, code = e.error_code(), "dropping link");
            net.send_to_link(link, &e.to_error_line());
            net.squit_link(link, &e.to_string());
        }
    }
}
