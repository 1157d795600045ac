//! OPER.

use meshirc_proto::{Line, irc_eq, wildcard_match};
use tracing::{info, warn};

use super::super::ClientHandler;
use crate::error::{CommandError, CommandResult};
use crate::propagate::Caps;
use crate::replies::{self, numeric};
use crate::state::{ClientId, Network, OperPrivs, UserModes};

/// `OPER <name> <password>`
pub struct OperHandler;

impl ClientHandler for OperHandler {
    fn handle(&self, net: &mut Network, client: ClientId, line: &Line<'_>) -> CommandResult {
        let (Some(name), Some(password)) = (line.param(0), line.param(1)) else {
            return Err(CommandError::NeedMoreParams);
        };
        let Some((nick, uid, mask, before)) = net
            .client(client)
            .map(|c| (c.nick.clone(), c.uid.clone(), c.hostmask(), c.umodes))
        else {
            return Ok(());
        };

        let block = net
            .config
            .oper
            .iter()
            .find(|o| irc_eq(&o.name, name))
            .filter(|o| o.hostmask.as_deref().is_none_or(|m| wildcard_match(m, &mask)))
            .cloned()
            .ok_or(CommandError::NoOperHost)?;
        if !block.verify_password(password) {
            warn!(%nick, oper = %block.name, "failed OPER attempt");
            net.notice_opers(&format!("Failed OPER attempt by {mask} ({})", block.name));
            return Err(CommandError::PasswdMismatch);
        }

        if let Some(c) = net.client_mut(client) {
            c.umodes |= UserModes::OPER;
            c.privs = OperPrivs::from_names(&block.privileges);
        }
        info!(%nick, oper = %block.name, "client opered up");

        let me = net.name().to_string();
        net.send_to_client(client, &numeric(&me, replies::RPL_YOUREOPER, &nick, ":You are now an IRC operator"));
        if !before.contains(UserModes::OPER) {
            net.send_to_client(client, &format!(":{nick} MODE {nick} :+o"));
            let b = net.broadcast(None);
            net.relay(&b, Caps::TS6, Caps::empty(), &[format!(":{uid} MODE {uid} :+o")]);
        }
        Ok(())
    }
}
