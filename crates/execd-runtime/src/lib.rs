//! # execd-runtime
//!
//! Command execution runtime for execd.
//!
//! This crate provides:
//! - Output capture files per session
//! - File tailing with newline/carriage-return record splitting
//! - The session registry (one kernel per session)
//! - The execution engine (foreground and background runs)
//! - Status queries, cursor-based output seeks and interrupts
//! - Retention of capture files for finished sessions
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on execd-core and is
//! driven by the protocol layer in the `execd` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capture;
pub mod engine;
pub mod hooks;
pub mod interrupt;
pub mod kernel;
pub mod registry;
pub mod retention;
pub mod status;
pub mod tailer;

// Re-export commonly used types
pub use capture::{CaptureFiles, CapturePaths, OutputCapture};
pub use engine::{CommandOutcome, EngineConfig, ExecutionEngine, RunOutcome, RunRequest};
pub use hooks::{ChannelHooks, CommandEvent, ExecutionHooks};
pub use kernel::{CommandKernel, ProcessHandle, StopSignal};
pub use registry::{InMemoryRegistry, SessionRegistry, SessionRegistryExt};
pub use retention::RetentionPolicy;
pub use status::OutputChunk;
pub use tailer::{TailError, Tailer};
