//! Error types for execd.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SessionId;

/// Application error code reported to clients.
///
/// Distinguishes client-caused failures from execution-caused ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or missing fields, unknown session for output seeks
    InvalidRequest,
    /// Session id absent from the registry
    NotFound,
    /// Process spawn or execution infrastructure failure
    RuntimeError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::NotFound => "NotFound",
            Self::RuntimeError => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// Main error type for execd operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session id already registered
    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),

    /// Malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Execution infrastructure failure
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Application error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SessionNotFound(_) => ErrorCode::NotFound,
            Self::DuplicateSession(_) | Self::InvalidRequest(_) | Self::Config(_) => {
                ErrorCode::InvalidRequest
            }
            Self::Serialization(_) => ErrorCode::InvalidRequest,
            Self::Runtime(_) | Self::Io(_) => ErrorCode::RuntimeError,
        }
    }

    /// HTTP-like status matching the error code.
    pub fn http_status(&self) -> u16 {
        match self.error_code() {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::RuntimeError => 500,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
