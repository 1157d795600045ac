//! Numeric replies used by the daemon.

pub const RPL_WELCOME: u16 = 1;
pub const RPL_YOURHOST: u16 = 2;
pub const RPL_MYINFO: u16 = 4;
pub const RPL_ISUPPORT: u16 = 5;
pub const RPL_UMODEIS: u16 = 221;
pub const RPL_CHANNELMODEIS: u16 = 324;
pub const RPL_CREATIONTIME: u16 = 329;
pub const RPL_NOTOPIC: u16 = 331;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_INVITELIST: u16 = 346;
pub const RPL_ENDOFINVITELIST: u16 = 347;
pub const RPL_EXCEPTLIST: u16 = 348;
pub const RPL_ENDOFEXCEPTLIST: u16 = 349;
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;
pub const RPL_BANLIST: u16 = 367;
pub const RPL_ENDOFBANLIST: u16 = 368;
pub const RPL_YOUREOPER: u16 = 381;
pub const RPL_QUIETLIST: u16 = 728;
pub const RPL_ENDOFQUIETLIST: u16 = 729;

pub const ERR_NOSUCHNICK: u16 = 401;
pub const ERR_NOSUCHCHANNEL: u16 = 403;
pub const ERR_CANNOTSENDTOCHAN: u16 = 404;
pub const ERR_NORECIPIENT: u16 = 411;
pub const ERR_NOTEXTTOSEND: u16 = 412;
pub const ERR_UNKNOWNCOMMAND: u16 = 421;
pub const ERR_NONICKNAMEGIVEN: u16 = 431;
pub const ERR_ERRONEUSNICKNAME: u16 = 432;
pub const ERR_NICKNAMEINUSE: u16 = 433;
pub const ERR_USERNOTINCHANNEL: u16 = 441;
pub const ERR_NOTONCHANNEL: u16 = 442;
pub const ERR_NOTREGISTERED: u16 = 451;
pub const ERR_NEEDMOREPARAMS: u16 = 461;
pub const ERR_ALREADYREGISTRED: u16 = 462;
pub const ERR_PASSWDMISMATCH: u16 = 464;
pub const ERR_LINKCHANNEL: u16 = 470;
pub const ERR_CHANNELISFULL: u16 = 471;
pub const ERR_UNKNOWNMODE: u16 = 472;
pub const ERR_INVITEONLYCHAN: u16 = 473;
pub const ERR_BANNEDFROMCHAN: u16 = 474;
pub const ERR_BADCHANNELKEY: u16 = 475;
pub const ERR_NEEDREGGEDNICK: u16 = 477;
pub const ERR_BANLISTFULL: u16 = 478;
pub const ERR_BADCHANNAME: u16 = 479;
pub const ERR_THROTTLE: u16 = 480;
pub const ERR_NOPRIVILEGES: u16 = 481;
pub const ERR_CHANOPRIVSNEEDED: u16 = 482;
pub const ERR_ISCHANSERVICE: u16 = 484;
pub const ERR_USERSDONTMATCH: u16 = 502;
pub const ERR_NOOPERHOST: u16 = 491;
pub const ERR_INVALIDBAN: u16 = 725;
pub const ERR_MLOCKRESTRICTED: u16 = 742;

/// `:<server> <code> <target> <rest>`, with the code zero-padded.
pub fn numeric(server: &str, code: u16, target: &str, rest: &str) -> String {
    let target = if target.is_empty() { "*" } else { target };
    format!(":{server} {code:03} {target} {rest}")
}
