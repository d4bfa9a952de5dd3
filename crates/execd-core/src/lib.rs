//! # execd-core
//!
//! Core types for the execd command execution daemon.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other execd crates. It provides:
//!
//! - Session types (SessionId, ExecMode, CommandStatus)
//! - Error types and the application error taxonomy
//! - Server configuration loaded from YAML
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other execd crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use config::{ExecutionSettings, RetentionSettings, ServerConfig, ServerSettings};
pub use error::{Error, ErrorCode, Result};
pub use session::{CommandStatus, ExecMode, SessionId};
