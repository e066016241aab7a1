//! Message protocol definitions
//!
//! Newline-delimited text protocol. Client lines are parsed into
//! `Command`s by their leading token (case-insensitive); server lines
//! are rendered from `ServerMessage` through `Display`.

use std::fmt;

use crate::error::AppError;
use crate::types::Nickname;

/// Client → Server command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a nickname (candidate not yet validated)
    Nick(String),
    /// Broadcast to every registered identity
    Msg(String),
    /// Direct message to one identity
    Direct { to: String, text: String },
    /// Request the presence list
    Who,
    /// Disconnect request
    Quit,
    /// Blank line
    Empty,
    /// Unrecognized command token
    Unknown(String),
}

impl Command {
    /// Parse one trimmed line
    ///
    /// Fails only for a `MSG @...` payload without a name and text.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        if line.is_empty() {
            return Ok(Command::Empty);
        }

        let (token, rest) = match line.split_once(' ') {
            Some((token, rest)) => (token, Some(rest)),
            None => (line, None),
        };

        let command = match token.to_ascii_uppercase().as_str() {
            "NICK" => match rest {
                Some(name) => Command::Nick(name.trim().to_string()),
                // a NICK without an argument is not a registration attempt
                None => Command::Unknown(token.to_string()),
            },
            "MSG" => {
                let payload = rest.unwrap_or_default();
                match payload.strip_prefix('@') {
                    Some(direct) => parse_direct(direct)?,
                    None => Command::Msg(payload.to_string()),
                }
            }
            "WHO" => Command::Who,
            "QUIT" => Command::Quit,
            _ => Command::Unknown(token.to_string()),
        };
        Ok(command)
    }
}

fn parse_direct(payload: &str) -> Result<Command, AppError> {
    let (to, text) = payload.split_once(' ').ok_or(AppError::InvalidDmFormat)?;
    if to.is_empty() {
        return Err(AppError::InvalidDmFormat);
    }
    Ok(Command::Direct {
        to: to.to_string(),
        text: text.to_string(),
    })
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Greeting sent right after accept
    Welcome(String),
    /// Nickname registered
    NickAccepted(Nickname),
    /// Broadcast delivery, including the sender's echo
    Broadcast { from: Nickname, text: String },
    /// Direct message delivery to the destination
    DirectFrom { from: Nickname, text: String },
    /// Direct message confirmation to the sender
    DirectTo { to: Nickname, text: String },
    /// Join/leave notice
    System(String),
    /// Presence list, already sorted
    Users(Vec<Nickname>),
    /// Disconnect acknowledgment
    Bye,
    /// Recoverable error
    Error(ErrorCode),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome(text) => write!(f, "WELCOME {text}"),
            ServerMessage::NickAccepted(nick) => write!(f, "OK nick {nick}"),
            ServerMessage::Broadcast { from, text } => write!(f, "FROM {from} [all]: {text}"),
            ServerMessage::DirectFrom { from, text } => write!(f, "FROM {from} [dm]: {text}"),
            ServerMessage::DirectTo { to, text } => write!(f, "TO @{to} [dm]: {text}"),
            ServerMessage::System(text) => write!(f, "SYSTEM: {text}"),
            ServerMessage::Users(names) => {
                f.write_str("USERS ")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}")?;
                }
                Ok(())
            }
            ServerMessage::Bye => f.write_str("BYE"),
            ServerMessage::Error(code) => write!(f, "ERR {code}"),
        }
    }
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidNick,
    NicknameInUse,
    IdentifyFirst,
    InvalidDmFormat,
    UserNotFound,
    UnknownCommand,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidNick => "invalid_nick",
            ErrorCode::NicknameInUse => "nickname_in_use",
            ErrorCode::IdentifyFirst => "identify_with_NICK_first",
            ErrorCode::InvalidDmFormat => "invalid_dm_format",
            ErrorCode::UserNotFound => "user_not_found",
            ErrorCode::UnknownCommand => "unknown_command",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
