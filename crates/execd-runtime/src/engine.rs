//! Execution engine: spawns commands and tracks them to completion.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use execd_core::{Error, ExecMode, ExecutionSettings, Result, SessionId};

use crate::capture::{CaptureFiles, CapturePaths, OutputCapture};
use crate::hooks::ExecutionHooks;
use crate::kernel::{CommandKernel, ProcessHandle};
use crate::registry::{InMemoryRegistry, SessionRegistry, SessionRegistryExt};
use crate::tailer::{Tailer, DEFAULT_MAX_RECORD_BYTES, DEFAULT_POLL_INTERVAL};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter invoked as `<shell> -c <code>`
    pub shell: String,
    /// Tailer poll period
    pub poll_interval: Duration,
    /// Tailer record cap
    pub max_record_bytes: usize,
    /// Delay after a foreground completion before `run` returns
    pub completion_grace: Duration,
    /// Delay before an interrupted command is force-killed
    pub interrupt_grace: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            completion_grace: Duration::from_millis(100),
            interrupt_grace: Some(Duration::from_secs(3)),
        }
    }
}

impl From<&ExecutionSettings> for EngineConfig {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            shell: settings.shell.clone(),
            poll_interval: settings.poll_interval(),
            max_record_bytes: settings.max_record_bytes,
            completion_grace: settings.completion_grace(),
            interrupt_grace: settings.interrupt_grace(),
        }
    }
}

/// A request to run one command.
pub struct RunRequest {
    /// Foreground or background
    pub mode: ExecMode,
    /// Shell code to execute
    pub code: String,
    /// Working directory (None = inherit)
    pub cwd: Option<PathBuf>,
    /// Caller-chosen session id (None = generate)
    pub session_id: Option<SessionId>,
    /// Event hooks
    pub hooks: Option<Arc<dyn ExecutionHooks>>,
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("mode", &self.mode)
            .field("code", &self.code)
            .field("cwd", &self.cwd)
            .field("session_id", &self.session_id)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl RunRequest {
    /// Request with the given mode.
    pub fn new(mode: ExecMode, code: impl Into<String>) -> Self {
        Self {
            mode,
            code: code.into(),
            cwd: None,
            session_id: None,
            hooks: None,
        }
    }

    /// Foreground request.
    pub fn command(code: impl Into<String>) -> Self {
        Self::new(ExecMode::Command, code)
    }

    /// Background request.
    pub fn background(code: impl Into<String>) -> Self {
        Self::new(ExecMode::BackgroundCommand, code)
    }

    /// Run in `cwd`.
    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Use a caller-chosen session id.
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach event hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn ExecutionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(Error::InvalidRequest("command cannot be empty".to_string()));
        }
        if let Some(cwd) = &self.cwd {
            match std::fs::metadata(cwd) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(Error::InvalidRequest(format!(
                        "working directory is not a directory: {}",
                        cwd.display()
                    )))
                }
                Err(e) => {
                    return Err(Error::InvalidRequest(format!(
                        "working directory {} is not usable: {e}",
                        cwd.display()
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Final result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Session identifier
    pub session_id: SessionId,
    /// Exit code, absent when killed by a signal or never spawned
    pub exit_code: Option<i32>,
    /// Failure unrelated to the exit code
    pub error: Option<String>,
    /// Wall time from spawn to completion
    pub elapsed: Duration,
}

/// What `run` hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Foreground command finished
    Completed(CommandOutcome),
    /// Background command detached
    Detached(SessionId),
}

impl RunOutcome {
    /// Session the run belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Completed(outcome) => &outcome.session_id,
            Self::Detached(session_id) => session_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Runs commands and records their lifecycle in a session registry.
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<dyn SessionRegistry>,
    capture: OutputCapture,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("capture", &self.capture)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine over an injected registry.
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        capture: OutputCapture,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            capture,
            config: Arc::new(config),
        }
    }

    /// Create an engine with a fresh in-memory registry.
    pub fn in_memory(capture: OutputCapture, config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryRegistry::new()), capture, config)
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    /// Output capture.
    pub fn capture(&self) -> &OutputCapture {
        &self.capture
    }

    /// Engine tuning.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a command.
    ///
    /// Foreground requests resolve once the process exited and its output
    /// was drained through the hooks. Background requests resolve right
    /// after spawn; completion is recorded asynchronously.
    ///
    /// Validation failures are returned before anything is allocated. A
    /// background spawn failure is only visible through the session status.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        request.validate()?;
        let RunRequest {
            mode,
            code,
            cwd,
            session_id,
            hooks,
        } = request;

        let session_id = session_id.unwrap_or_default();
        let paths = self.capture.paths(&session_id);
        self.registry.register(CommandKernel::new(
            session_id.clone(),
            paths.clone(),
            mode.is_background(),
        ))?;

        let files = match self.capture.open(&session_id, mode) {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to create capture files: session={}, {}", session_id, e);
                self.registry.remove(&session_id);
                return Err(Error::Runtime(format!("failed to create capture files: {e}")));
            }
        };

        info!(
            "Running command: session={}, mode={:?}, cwd={:?}",
            session_id, mode, cwd
        );
        if let Some(hooks) = &hooks {
            hooks.on_init(&session_id);
        }

        let started = Instant::now();
        let child = match self.spawn(&code, cwd.as_deref(), files) {
            Ok(child) => child,
            Err(e) => return self.fail_spawn(session_id, mode, hooks.as_deref(), e),
        };

        if let Some(pid) = child.id() {
            debug!("Spawned process: session={}, pid={}", session_id, pid);
            match self
                .registry
                .modify(&session_id, |kernel| kernel.attach_process(ProcessHandle::new(pid)))
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Failed to deliver deferred stop signal: session={}, {}",
                    session_id, e
                ),
                Err(e) => warn!("Failed to attach process to kernel: {}", e),
            }
        }

        if mode.is_background() {
            let engine = self.clone();
            let id = session_id.clone();
            tokio::spawn(async move {
                engine.supervise(id, child, paths, mode, hooks, started).await;
            });
            return Ok(RunOutcome::Detached(session_id));
        }

        let outcome = self
            .supervise(session_id.clone(), child, paths, mode, hooks, started)
            .await;
        if let Err(e) = self.registry.modify(&session_id, |kernel| kernel.mark_consumed()) {
            warn!("Failed to mark foreground output consumed: {}", e);
        }
        if !self.config.completion_grace.is_zero() {
            tokio::time::sleep(self.config.completion_grace).await;
        }
        Ok(RunOutcome::Completed(outcome))
    }

    fn spawn(&self, code: &str, cwd: Option<&Path>, files: CaptureFiles) -> io::Result<Child> {
        let mut command = Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::from(files.stdout))
            .stderr(Stdio::from(files.stderr));
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        command.process_group(0);
        command.spawn()
    }

    fn fail_spawn(
        &self,
        session_id: SessionId,
        mode: ExecMode,
        hooks: Option<&dyn ExecutionHooks>,
        err: io::Error,
    ) -> Result<RunOutcome> {
        let message = format!("failed to spawn command: {err}");
        error!("{}: session={}", message, session_id);

        if let Err(e) = self
            .registry
            .modify(&session_id, |kernel| kernel.finish(None, Some(message.clone())))
        {
            warn!("Failed to record spawn failure: {}", e);
        }
        if let Some(hooks) = hooks {
            hooks.on_error(&message);
        }

        if mode.is_background() {
            return Ok(RunOutcome::Detached(session_id));
        }
        if let Err(e) = self.registry.modify(&session_id, |kernel| kernel.mark_consumed()) {
            warn!("Failed to mark failed session consumed: {}", e);
        }
        Err(Error::Runtime(message))
    }

    /// Wait for the process, drain its output, and record completion.
    async fn supervise(
        &self,
        session_id: SessionId,
        mut child: Child,
        paths: CapturePaths,
        mode: ExecMode,
        hooks: Option<Arc<dyn ExecutionHooks>>,
        started: Instant,
    ) -> CommandOutcome {
        let done = Arc::new(AtomicBool::new(false));
        let tails = match &hooks {
            Some(hooks) if mode.is_background() => vec![self.spawn_tail(
                paths.combined,
                OutputStream::Stdout,
                Arc::clone(hooks),
                Arc::clone(&done),
            )],
            Some(hooks) => vec![
                self.spawn_tail(
                    paths.stdout,
                    OutputStream::Stdout,
                    Arc::clone(hooks),
                    Arc::clone(&done),
                ),
                self.spawn_tail(
                    paths.stderr,
                    OutputStream::Stderr,
                    Arc::clone(hooks),
                    Arc::clone(&done),
                ),
            ],
            None => Vec::new(),
        };

        let status = child.wait().await;
        done.store(true, Ordering::Release);
        for tail in tails {
            if let Err(e) = tail.await {
                warn!("Tail task failed: session={}, {}", session_id, e);
            }
        }

        let outcome = self.complete(&session_id, status, started.elapsed());
        if let Some(hooks) = &hooks {
            if let Some(error) = &outcome.error {
                hooks.on_error(error);
            }
            hooks.on_complete(&outcome);
        }
        outcome
    }

    fn spawn_tail(
        &self,
        path: PathBuf,
        stream: OutputStream,
        hooks: Arc<dyn ExecutionHooks>,
        done: Arc<AtomicBool>,
    ) -> JoinHandle<u64> {
        let tailer = Tailer::new(path).with_max_record_bytes(self.config.max_record_bytes);
        let interval = self.config.poll_interval;
        tokio::spawn(async move {
            tailer
                .follow(
                    interval,
                    move || !done.load(Ordering::Acquire),
                    |line| match stream {
                        OutputStream::Stdout => hooks.on_stdout(line),
                        OutputStream::Stderr => hooks.on_stderr(line),
                    },
                )
                .await
        })
    }

    fn complete(
        &self,
        session_id: &SessionId,
        status: io::Result<ExitStatus>,
        elapsed: Duration,
    ) -> CommandOutcome {
        let (exit_code, error) = match status {
            Ok(status) => match status.code() {
                Some(code) => (Some(code), None),
                None => (None, Some(describe_exit(&status))),
            },
            Err(e) => (None, Some(format!("failed to wait for process: {e}"))),
        };

        if let Err(e) = self
            .registry
            .modify(session_id, |kernel| kernel.finish(exit_code, error.clone()))
        {
            warn!("Failed to record completion: session={}, {}", session_id, e);
        }
        info!(
            "Command finished: session={}, exit_code={:?}, error={:?}, elapsed={:?}",
            session_id, exit_code, error, elapsed
        );

        CommandOutcome {
            session_id: session_id.clone(),
            exit_code,
            error,
            elapsed,
        }
    }
}

#[cfg(unix)]
fn describe_exit(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => format!("exited without a status code: {status}"),
    }
}

#[cfg(not(unix))]
fn describe_exit(status: &ExitStatus) -> String {
    format!("exited without a status code: {status}")
}
