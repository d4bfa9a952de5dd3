//! execd Library
//!
//! Protocol layer types and handlers for the execd daemon, plus the
//! command line parsing used by the binary in main.rs.

pub mod cli;
pub mod protocol;
pub mod tools;

// Re-export commonly used types
pub use cli::Cli;
pub use protocol::ExecdServer;
pub use tools::*;
