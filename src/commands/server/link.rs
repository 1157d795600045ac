//! Link upkeep: PING, PONG, ERROR, SID and SQUIT.

use meshirc_proto::Line;
use tracing::{info, warn};

use super::super::{ServerContext, ServerHandler};
use super::need;
use crate::error::LinkError;
use crate::propagate::{Caps, ServerInfo};
use crate::state::Network;

/// `PING <origin> [<destination>]`
pub struct PingHandler;

impl ServerHandler for PingHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        let origin = line.param(0).unwrap_or(ctx.source.as_str());
        let line = format!(":{} PONG {} :{origin}", net.sid(), net.name());
        net.send_to_link(ctx.link, &line);
        Ok(())
    }
}

pub struct PongHandler;

impl ServerHandler for PongHandler {
    fn handle(&self, _net: &mut Network, _ctx: &ServerContext, _line: &Line<'_>) -> Result<(), LinkError> {
        Ok(())
    }
}

/// The peer is about to close on us.
pub struct ErrorHandler;

impl ServerHandler for ErrorHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        let name = net.links.get(&ctx.link).map(|l| l.name.clone()).unwrap_or_default();
        let message = line.param(0).unwrap_or_default();
        warn!(server = %name, %message, "ERROR from peer");
        net.notice_opers(&format!("ERROR :from {name} -- {message}"));
        Ok(())
    }
}

/// `:<uplink> SID <name> <hops> <sid> :<description>`
pub struct SidHandler;

impl ServerHandler for SidHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 4)?;
        let (name, hops, sid, info) = (line.params[0], line.params[1], line.params[2], line.params[3]);
        let hopcount: u32 = hops
            .parse()
            .map_err(|_| LinkError::Protocol(format!("SID: bad hopcount {hops:?}")))?;
        if net.topology.contains(sid) {
            return Err(LinkError::SidInUse(sid.to_string()));
        }
        if net.topology.by_name(name).is_some() {
            return Err(LinkError::ServerExists(name.to_string()));
        }
        net.topology.add_server(ServerInfo {
            sid: sid.to_string(),
            name: name.to_string(),
            info: info.to_string(),
            hopcount,
            via: Some(ctx.source.clone()),
            link: Some(ctx.link),
        });
        info!(server = %name, %sid, hops = hopcount, via = %ctx.source, "server introduced");

        let b = net.broadcast(Some(ctx.link));
        let relayed = format!(":{} SID {name} {} {sid} :{info}", ctx.source, hopcount + 1);
        net.relay(&b, Caps::TS6, Caps::empty(), &[relayed]);
        Ok(())
    }
}

/// `:<source> SQUIT <sid> :<reason>`
pub struct SquitHandler;

impl ServerHandler for SquitHandler {
    fn handle(&self, net: &mut Network, ctx: &ServerContext, line: &Line<'_>) -> Result<(), LinkError> {
        need(line, 1)?;
        let target = line.params[0];
        let reason = line.param(1).unwrap_or("Remote server quit");
        let link_sid = net.links.get(&ctx.link).map(|l| l.sid.clone()).unwrap_or_default();

        if target == net.sid() || target == link_sid {
            net.squit_link(ctx.link, reason);
        } else if net.topology.route(target) == Some(ctx.link) {
            net.split_server(target, reason, Some(ctx.link));
        }
        Ok(())
    }
}
