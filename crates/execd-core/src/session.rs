//! Session types for command execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Longest accepted session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Unique identifier for a command session.
///
/// Identifiers are opaque strings, either generated by the server or supplied
/// by the caller. Capture files are named after the identifier, so only
/// ASCII alphanumerics, `-`, `_` and `.` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a caller-supplied session ID.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::InvalidRequest("session id cannot be empty".to_string()));
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(Error::InvalidRequest(format!(
                "session id exceeds {MAX_SESSION_ID_LEN} characters"
            )));
        }
        if raw == "." || raw == ".." {
            return Err(Error::InvalidRequest(format!("invalid session id: {raw}")));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::InvalidRequest(format!(
                "session id contains unsupported characters: {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(raw)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Caller blocks until completion and receives live output records.
    Command,
    /// Caller gets the session id immediately; output is polled later.
    BackgroundCommand,
}

impl ExecMode {
    /// Select a mode from a `background` flag.
    pub fn from_background(background: bool) -> Self {
        if background {
            Self::BackgroundCommand
        } else {
            Self::Command
        }
    }

    /// Whether this mode detaches from the caller.
    pub fn is_background(self) -> bool {
        matches!(self, Self::BackgroundCommand)
    }
}

/// Point-in-time status of a command session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
    /// Session identifier
    pub session_id: SessionId,
    /// Whether the process is still running
    pub running: bool,
    /// Exit code, absent while running or when killed by a signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Failure unrelated to the exit code (spawn failure, signal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the session was started
    pub started_at: DateTime<Utc>,
    /// When the process finished, absent while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
