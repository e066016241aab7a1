//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use std::net::SocketAddr;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::message::ErrorCode;

/// Application-level errors
///
/// Covers both fatal errors (session termination) and
/// protocol errors (answered with an `ERR` line, session stays open).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing or UTF-8 decode error (fatal)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Outbound channel closed, the peer is gone (fatal)
    #[error("Channel send error")]
    ChannelSend,

    /// No line received within the configured idle limit (fatal)
    #[error("Idle timeout")]
    IdleTimeout,

    /// Listening endpoint could not be set up (fatal, startup)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Routing was attempted for an identity that is not registered
    #[error("Sender {0} is not registered")]
    NotRegistered(String),

    /// Nickname violates the length or character rules
    #[error("Invalid nickname")]
    InvalidNick,

    /// Nickname already held by another connection
    #[error("Nickname already in use")]
    NicknameInUse,

    /// Command sent before registering a nickname
    #[error("Identify with NICK first")]
    IdentifyFirst,

    /// Direct message without a `@name text` shape
    #[error("Invalid direct message format")]
    InvalidDmFormat,

    /// Direct message destination is not connected
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Unrecognized command token
    #[error("Unknown command")]
    UnknownCommand,
}

impl AppError {
    /// Wire error code for recoverable errors
    ///
    /// Returns None for errors that terminate the session.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::InvalidNick => Some(ErrorCode::InvalidNick),
            AppError::NicknameInUse => Some(ErrorCode::NicknameInUse),
            AppError::IdentifyFirst => Some(ErrorCode::IdentifyFirst),
            AppError::InvalidDmFormat => Some(ErrorCode::InvalidDmFormat),
            AppError::UserNotFound(_) => Some(ErrorCode::UserNotFound),
            AppError::UnknownCommand => Some(ErrorCode::UnknownCommand),
            _ => None,
        }
    }
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::ChannelSend
    }
}

/// Message send errors
///
/// Occurs when a client's outbound channel is closed or stays full.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The receiver stayed full past the delivery limit
    #[error("Delivery timed out")]
    Timeout,
}
