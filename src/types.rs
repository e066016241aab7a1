//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based identity of one accepted connection
//! - `Nickname`: validated display name registered by a client

use std::borrow::Borrow;

use uuid::Uuid;

use crate::error::AppError;

/// Minimum nickname length in characters
pub const NICK_MIN_LEN: usize = 3;

/// Maximum nickname length in characters
pub const NICK_MAX_LEN: usize = 20;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Two handles refer to the same connection
/// exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered display name
///
/// 3-20 characters, alphanumeric plus `_` and `-`. Ordering is
/// lexicographic so presence listings sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nickname(String);

impl Nickname {
    /// Validate a candidate name
    pub fn parse(candidate: &str) -> Result<Self, AppError> {
        let len = candidate.chars().count();
        if !(NICK_MIN_LEN..=NICK_MAX_LEN).contains(&len) {
            return Err(AppError::InvalidNick);
        }
        if !candidate
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::InvalidNick);
        }
        Ok(Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Lets the registry be queried with a plain `&str`.
impl Borrow<str> for Nickname {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
