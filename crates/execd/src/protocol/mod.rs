//! MCP Protocol Layer
//!
//! Model Context Protocol server built on rmcp 0.9, exposing the execution
//! engine as MCP tools.

pub mod server;

pub use server::{stream_run, to_mcp_error, ExecdServer};
