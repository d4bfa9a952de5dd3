//! MCP Tool Types
//!
//! Parameter and response types for every execd tool, plus the error
//! envelope attached to failed calls.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use execd_core::{CommandStatus, Error, ErrorCode};
use execd_runtime::{CommandEvent, CommandOutcome, OutputChunk};

// =============================================================================
// Command Execution Tools
// =============================================================================

/// Parameters for run_command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCommandParams {
    /// Shell code to execute (passed to `<shell> -c`)
    pub command: String,

    /// Working directory
    #[serde(default)]
    pub cwd: Option<String>,

    /// Run detached and poll with get_command_output
    #[serde(default)]
    pub background: bool,

    /// Caller-chosen session id; generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response for a background run_command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCommandResponse {
    /// Session identifier for status, output and interrupt calls
    pub session_id: String,

    /// Status message
    pub message: String,
}

/// One event of a foreground run, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session registered
    Init {
        /// Session identifier
        session_id: String,
    },
    /// One stdout record
    Stdout {
        /// Record text without delimiter
        text: String,
    },
    /// One stderr record
    Stderr {
        /// Record text without delimiter
        text: String,
    },
    /// Execution failed without an exit code
    Error {
        /// Failure description
        error: String,
    },
    /// Terminal event
    ExecutionComplete {
        /// Session identifier
        session_id: String,
        /// Exit code, absent when killed by a signal
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        /// Wall time in milliseconds
        execution_time_ms: u64,
    },
}

impl From<CommandEvent> for ServerEvent {
    fn from(event: CommandEvent) -> Self {
        match event {
            CommandEvent::Init(session_id) => Self::Init {
                session_id: session_id.to_string(),
            },
            CommandEvent::Stdout(text) => Self::Stdout { text },
            CommandEvent::Stderr(text) => Self::Stderr { text },
            CommandEvent::Error(error) => Self::Error { error },
            CommandEvent::Complete(outcome) => Self::from(&outcome),
        }
    }
}

impl From<&CommandOutcome> for ServerEvent {
    fn from(outcome: &CommandOutcome) -> Self {
        Self::ExecutionComplete {
            session_id: outcome.session_id.to_string(),
            exit_code: outcome.exit_code,
            execution_time_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// =============================================================================
// Status and Output Tools
// =============================================================================

/// Parameters for get_command_status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandStatusParams {
    /// Session ID
    pub session_id: String,
}

/// Response for get_command_status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandStatusResponse {
    /// Session ID
    pub session_id: String,

    /// Whether the process is still running
    pub running: bool,

    /// Exit code once finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Failure unrelated to the exit code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// RFC 3339 start time
    pub started_at: String,

    /// RFC 3339 finish time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<CommandStatus> for CommandStatusResponse {
    fn from(status: CommandStatus) -> Self {
        Self {
            session_id: status.session_id.to_string(),
            running: status.running,
            exit_code: status.exit_code,
            error: status.error,
            started_at: status.started_at.to_rfc3339(),
            finished_at: status.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Parameters for get_command_output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandOutputParams {
    /// Session ID of a background command
    pub session_id: String,

    /// Byte offset returned by the previous call (0 to start)
    #[serde(default)]
    pub cursor: u64,
}

/// Response for get_command_output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandOutputResponse {
    /// Output since the requested cursor (lossy UTF-8)
    pub output: String,

    /// Cursor for the next call
    pub cursor: u64,

    /// Whether more output may follow
    pub running: bool,
}

impl From<OutputChunk> for CommandOutputResponse {
    /// While the command runs, a multibyte character cut off at the end of
    /// the chunk is left for the next call instead of being replaced.
    fn from(chunk: OutputChunk) -> Self {
        let OutputChunk {
            mut data,
            cursor,
            running,
        } = chunk;
        let held = if running { incomplete_utf8_tail(&data) } else { 0 };
        data.truncate(data.len() - held);

        Self {
            output: String::from_utf8_lossy(&data).into_owned(),
            cursor: cursor - held as u64,
            running,
        }
    }
}

/// Length of a trailing UTF-8 sequence that is valid so far but incomplete.
fn incomplete_utf8_tail(data: &[u8]) -> usize {
    let mut rest = data;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => return 0,
            Err(e) => match e.error_len() {
                None => return rest.len() - e.valid_up_to(),
                Some(invalid) => rest = &rest[e.valid_up_to() + invalid..],
            },
        }
    }
}

// =============================================================================
// Interrupt Tool
// =============================================================================

/// Parameters for interrupt_command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterruptParams {
    /// Session ID
    pub session_id: String,
}

/// Response for interrupt_command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterruptResponse {
    /// Session ID
    pub session_id: String,

    /// Status message
    pub message: String,
}

// =============================================================================
// Error Envelope
// =============================================================================

/// Structured failure attached to MCP errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP-like status (400, 404, 500)
    pub status: u16,

    /// Application error code
    pub code: ErrorCode,

    /// Human readable description
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            status: err.http_status(),
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}
