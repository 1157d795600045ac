//! Error types for command processing and linking.
//!
//! Command errors become numerics for the local invoker; link errors close
//! the link with `ERROR :<reason>`.

use thiserror::Error;

use crate::replies::{self, numeric};

// ============================================================================
// Command Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("no nickname given")]
    NoNicknameGiven,

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    #[error("cannot send to {0}")]
    CannotSendToChan(String),

    #[error("no recipient given")]
    NoRecipient(String),

    #[error("no text to send")]
    NoTextToSend,

    #[error("cannot change mode for other users")]
    UsersDontMatch,

    #[error("not on channel {0}")]
    NotOnChannel(String),

    #[error("{0} is not on {1}")]
    UserNotInChannel(String, String),

    #[error("not channel operator on {0}")]
    ChanOpPrivsNeeded(String),

    #[error("permission denied")]
    NoPrivileges,

    #[error("password incorrect")]
    PasswdMismatch,

    #[error("no oper block for this host")]
    NoOperHost,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("cannot join {channel}: {reason}")]
    CannotJoin { channel: String, reason: JoinError },

    /// The client asked to leave; no reply.
    #[error("client quit")]
    Quit(Option<String>),
}

impl CommandError {
    /// Stable label for metrics.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::NoNicknameGiven => "no_nickname_given",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::CannotSendToChan(_) => "cannot_send_to_chan",
            Self::NoRecipient(_) => "no_recipient",
            Self::NoTextToSend => "no_text_to_send",
            Self::UsersDontMatch => "users_dont_match",
            Self::NotOnChannel(_) => "not_on_channel",
            Self::UserNotInChannel(..) => "user_not_in_channel",
            Self::ChanOpPrivsNeeded(_) => "chanop_privs_needed",
            Self::NoPrivileges => "no_privileges",
            Self::PasswdMismatch => "passwd_mismatch",
            Self::NoOperHost => "no_oper_host",
            Self::UnknownCommand(_) => "unknown_command",
            Self::CannotJoin { .. } => "cannot_join",
            Self::Quit(_) => "quit",
        }
    }

    /// Numeric reply for the invoker, if the error has one.
    pub fn to_reply(&self, server: &str, nick: &str, command: &str) -> Option<String> {
        let (code, rest) = match self {
            Self::NeedMoreParams => (
                replies::ERR_NEEDMOREPARAMS,
                format!("{command} :Not enough parameters"),
            ),
            Self::NotRegistered => (
                replies::ERR_NOTREGISTERED,
                ":You have not registered".to_string(),
            ),
            Self::AlreadyRegistered => (
                replies::ERR_ALREADYREGISTRED,
                ":You may not reregister".to_string(),
            ),
            Self::NoNicknameGiven => (
                replies::ERR_NONICKNAMEGIVEN,
                ":No nickname given".to_string(),
            ),
            Self::ErroneousNickname(bad) => (
                replies::ERR_ERRONEUSNICKNAME,
                format!("{bad} :Erroneous Nickname"),
            ),
            Self::NicknameInUse(bad) => (
                replies::ERR_NICKNAMEINUSE,
                format!("{bad} :Nickname is already in use."),
            ),
            Self::NoSuchChannel(chan) => (
                replies::ERR_NOSUCHCHANNEL,
                format!("{chan} :No such channel"),
            ),
            Self::NoSuchNick(target) => (
                replies::ERR_NOSUCHNICK,
                format!("{target} :No such nick/channel"),
            ),
            Self::CannotSendToChan(chan) => (
                replies::ERR_CANNOTSENDTOCHAN,
                format!("{chan} :Cannot send to channel"),
            ),
            Self::NoRecipient(cmd) => (
                replies::ERR_NORECIPIENT,
                format!(":No recipient given ({cmd})"),
            ),
            Self::NoTextToSend => (
                replies::ERR_NOTEXTTOSEND,
                ":No text to send".to_string(),
            ),
            Self::UsersDontMatch => (
                replies::ERR_USERSDONTMATCH,
                ":Can't change mode for other users".to_string(),
            ),
            Self::NotOnChannel(chan) => (
                replies::ERR_NOTONCHANNEL,
                format!("{chan} :You're not on that channel"),
            ),
            Self::UserNotInChannel(target, chan) => (
                replies::ERR_USERNOTINCHANNEL,
                format!("{target} {chan} :They aren't on that channel"),
            ),
            Self::ChanOpPrivsNeeded(chan) => (
                replies::ERR_CHANOPRIVSNEEDED,
                format!("{chan} :You're not channel operator"),
            ),
            Self::NoPrivileges => (
                replies::ERR_NOPRIVILEGES,
                ":Permission Denied - You're not an IRC operator".to_string(),
            ),
            Self::PasswdMismatch => (
                replies::ERR_PASSWDMISMATCH,
                ":Password incorrect".to_string(),
            ),
            Self::NoOperHost => (
                replies::ERR_NOOPERHOST,
                ":No appropriate operator blocks were found for your host".to_string(),
            ),
            Self::UnknownCommand(cmd) => (
                replies::ERR_UNKNOWNCOMMAND,
                format!("{cmd} :Unknown command"),
            ),
            Self::CannotJoin { channel, reason } => {
                (reason.numeric(), format!("{channel} :{}", reason.text()))
            }
            Self::Quit(_) => return None,
        };
        Some(numeric(server, code, nick, &rest))
    }
}

pub type CommandResult = Result<(), CommandError>;

// ============================================================================
// Join Errors
// ============================================================================

/// Why a local client may not join a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("banned")]
    Banned,

    #[error("invite only")]
    InviteOnly,

    #[error("bad key")]
    BadKey,

    #[error("channel full")]
    Full,

    #[error("registered users only")]
    NeedRegistered,

    #[error("join throttled")]
    Throttled,

    /// Refused by a join hook.
    #[error("{reason}")]
    Denied { code: u16, reason: String },
}

impl JoinError {
    pub fn numeric(&self) -> u16 {
        match self {
            Self::Banned => replies::ERR_BANNEDFROMCHAN,
            Self::InviteOnly => replies::ERR_INVITEONLYCHAN,
            Self::BadKey => replies::ERR_BADCHANNELKEY,
            Self::Full => replies::ERR_CHANNELISFULL,
            Self::NeedRegistered => replies::ERR_NEEDREGGEDNICK,
            Self::Throttled => replies::ERR_THROTTLE,
            Self::Denied { code, .. } => *code,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Self::Banned => "Cannot join channel (+b) - you are banned".into(),
            Self::InviteOnly => "Cannot join channel (+i) - you must be invited".into(),
            Self::BadKey => "Cannot join channel (+k) - bad key".into(),
            Self::Full => "Cannot join channel (+l) - channel is full, try again later".into(),
            Self::NeedRegistered => {
                "Cannot join channel (+r) - you need to be identified with services".into()
            }
            Self::Throttled => "Cannot join channel (+j) - throttle exceeded, try again later".into(),
            Self::Denied { reason, .. } => reason.clone(),
        }
    }

    /// Refusals that a `+f` forward target may absorb.
    pub fn forwardable(&self) -> bool {
        matches!(self, Self::InviteOnly | Self::Full | Self::NeedRegistered)
    }
}

// ============================================================================
// Link Errors
// ============================================================================

/// Reasons to refuse a server link during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("No link block for {0}")]
    NoLinkBlock(String),

    #[error("Invalid password")]
    BadPassword,

    #[error("Non-TS6 server")]
    NotTs6,

    #[error("SID {0} does not match link block")]
    SidMismatch(String),

    #[error("SID {0} already in use")]
    SidInUse(String),

    #[error("Server {0} already exists")]
    ServerExists(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LinkError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoLinkBlock(_) => "no_link_block",
            Self::BadPassword => "bad_password",
            Self::NotTs6 => "not_ts6",
            Self::SidMismatch(_) => "sid_mismatch",
            Self::SidInUse(_) => "sid_in_use",
            Self::ServerExists(_) => "server_exists",
            Self::Protocol(_) => "protocol",
        }
    }

    /// The `ERROR` line sent before closing.
    pub fn to_error_line(&self) -> String {
        format!("ERROR :Closing Link: {self}")
    }
}
