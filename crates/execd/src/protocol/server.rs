//! execd MCP Server Implementation
//!
//! Routes MCP tool calls onto the execution engine using rmcp 0.9's
//! #[tool_router] pattern.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::{Peer, RoleServer},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use execd_core::{Error, ExecMode, Result as ExecResult, SessionId};
use execd_runtime::{ChannelHooks, ExecutionEngine, RunOutcome, RunRequest};

use crate::tools::{
    CommandOutputParams, CommandOutputResponse, CommandStatusParams, CommandStatusResponse,
    ErrorResponse, InterruptParams, InterruptResponse, RunCommandParams, RunCommandResponse,
    ServerEvent,
};

/// Convert an execd error into an MCP error carrying the error envelope.
pub fn to_mcp_error(err: &Error) -> McpError {
    let envelope = ErrorResponse::from(err);
    let code = if envelope.status >= 500 {
        ErrorCode(-32603) // Internal error
    } else {
        ErrorCode(-32602) // Invalid params
    };
    McpError::new(code, envelope.message.clone(), serde_json::to_value(&envelope).ok())
}

fn parse_session_id(raw: &str) -> Result<SessionId, McpError> {
    SessionId::parse(raw).map_err(|e| to_mcp_error(&e))
}

fn json_text<T: Serialize>(value: &T) -> Content {
    Content::text(serde_json::to_string_pretty(value).unwrap_or_default())
}

/// Run a foreground request, handing each event to `emit` as it happens.
///
/// Returns the run result together with every emitted event, in order.
pub async fn stream_run<F, Fut>(
    engine: &ExecutionEngine,
    request: RunRequest,
    mut emit: F,
) -> (ExecResult<RunOutcome>, Vec<ServerEvent>)
where
    F: FnMut(&ServerEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let (hooks, mut events) = ChannelHooks::new();
    let engine = engine.clone();
    let run = tokio::spawn(async move { engine.run(request.with_hooks(Arc::new(hooks))).await });

    // The channel closes once the run has dropped its hooks.
    let mut emitted = Vec::new();
    while let Some(event) = events.recv().await {
        let event = ServerEvent::from(event);
        emit(&event).await;
        emitted.push(event);
    }

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(e) => Err(Error::Runtime(format!("run task failed: {e}"))),
    };
    (outcome, emitted)
}

/// Forward a foreground event to the client as a logging notification.
async fn notify_event(peer: Peer<RoleServer>, event: serde_json::Value) {
    let param = LoggingMessageNotificationParam {
        level: LoggingLevel::Info,
        logger: Some("execd".to_string()),
        data: event,
    };
    if let Err(e) = peer.notify_logging_message(param).await {
        warn!("Failed to forward command event: {}", e);
    }
}

/// execd MCP Server
///
/// Exposes command execution, status, output and interrupt as MCP tools.
#[derive(Clone)]
pub struct ExecdServer {
    /// Engine owning the session registry
    engine: ExecutionEngine,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ExecdServer {
    /// Create a server over `engine`
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    /// Engine backing the tools
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Run a shell command
    #[tool(
        description = "Run a shell command. Foreground runs stream each output record as a \
                       logging notification and return all records with the exit code; \
                       background runs return a session id immediately"
    )]
    #[instrument(skip_all)]
    async fn run_command(
        &self,
        peer: Peer<RoleServer>,
        Parameters(params): Parameters<RunCommandParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "run_command: background={}, cwd={:?}, session_id={:?}",
            params.background, params.cwd, params.session_id
        );

        let mut request = RunRequest::new(ExecMode::from_background(params.background), params.command);
        request.cwd = params.cwd.filter(|cwd| !cwd.is_empty()).map(PathBuf::from);
        request.session_id = params
            .session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(parse_session_id)
            .transpose()?;

        if params.background {
            let outcome = self.engine.run(request).await.map_err(|e| {
                error!("Failed to start background command: {}", e);
                to_mcp_error(&e)
            })?;
            let session_id = outcome.session_id().to_string();
            let response = RunCommandResponse {
                message: format!("Command started in background as session {session_id}"),
                session_id,
            };
            return Ok(CallToolResult::success(vec![json_text(&response)]));
        }

        let (outcome, events) = stream_run(&self.engine, request, |event| {
            let peer = peer.clone();
            let data = serde_json::to_value(event).unwrap_or_default();
            notify_event(peer, data)
        })
        .await;
        let mut contents: Vec<Content> = events.iter().map(json_text).collect();

        match outcome {
            Ok(RunOutcome::Completed(outcome)) => {
                debug!(
                    "Foreground command finished: session={}, events={}",
                    outcome.session_id,
                    contents.len()
                );
                Ok(CallToolResult::success(contents))
            }
            Ok(RunOutcome::Detached(session_id)) => {
                Ok(CallToolResult::success(vec![json_text(&RunCommandResponse {
                    message: format!("Command detached as session {session_id}"),
                    session_id: session_id.to_string(),
                })]))
            }
            Err(e @ Error::Runtime(_)) if !contents.is_empty() => {
                error!("Foreground command failed: {}", e);
                contents.push(json_text(&ErrorResponse::from(&e)));
                Ok(CallToolResult::error(contents))
            }
            Err(e) => Err(to_mcp_error(&e)),
        }
    }

    /// Get the status of a command session
    #[tool(description = "Get the running state, exit code and timestamps of a command session")]
    #[instrument(skip_all)]
    async fn get_command_status(
        &self,
        Parameters(params): Parameters<CommandStatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id = parse_session_id(&params.session_id)?;
        let status = self
            .engine
            .get_status(&session_id)
            .map_err(|e| to_mcp_error(&e))?;

        Ok(CallToolResult::success(vec![json_text(
            &CommandStatusResponse::from(status),
        )]))
    }

    /// Read background command output from a cursor
    #[tool(
        description = "Read output of a background command from a byte cursor. Pass the returned \
                       cursor to the next call to continue without gaps or duplicates"
    )]
    #[instrument(skip_all)]
    async fn get_command_output(
        &self,
        Parameters(params): Parameters<CommandOutputParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id = SessionId::parse(&params.session_id).map_err(|e| to_mcp_error(&e))?;
        let chunk = self
            .engine
            .seek_output(&session_id, params.cursor)
            .map_err(|e| to_mcp_error(&e))?;

        debug!(
            "Output read: session={}, cursor={} -> {}",
            session_id, params.cursor, chunk.cursor
        );
        Ok(CallToolResult::success(vec![json_text(
            &CommandOutputResponse::from(chunk),
        )]))
    }

    /// Interrupt a running command
    #[tool(description = "Interrupt a running command. Interrupting a finished command is a no-op")]
    #[instrument(skip_all)]
    async fn interrupt_command(
        &self,
        Parameters(params): Parameters<InterruptParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id = parse_session_id(&params.session_id)?;
        self.engine
            .interrupt(&session_id)
            .map_err(|e| to_mcp_error(&e))?;

        let response = InterruptResponse {
            message: format!("Interrupt requested for session {session_id}"),
            session_id: session_id.to_string(),
        };
        Ok(CallToolResult::success(vec![json_text(&response)]))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for ExecdServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "execd - run shell commands inside the sandbox. \
                 Use run_command for foreground runs (output returned inline) or background runs \
                 (session id returned), get_command_status to poll state, get_command_output \
                 with a cursor to read background output, and interrupt_command to stop a run."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_logging()
                .build(),
            ..Default::default()
        }
    }
}
