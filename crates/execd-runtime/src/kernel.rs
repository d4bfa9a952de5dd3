//! Per-session state record ("kernel") and process capability.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use execd_core::{CommandStatus, SessionId};

use crate::capture::CapturePaths;

/// Signal used to stop a running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Polite termination request (SIGTERM)
    Terminate,
    /// Forced kill (SIGKILL)
    Kill,
}

#[cfg(unix)]
impl StopSignal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

/// Capability to signal a spawned process.
///
/// Owned by exactly one kernel and released when the process exits, so a
/// recycled pid is never signalled.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    /// Wrap the pid of a process spawned as its own process group leader.
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// OS process identifier.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Deliver `signal` to the process group, falling back to the process.
    #[cfg(unix)]
    pub fn signal(&self, signal: StopSignal) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        // SAFETY: kill(2) has no memory safety requirements.
        if unsafe { libc::kill(-pid, signal.as_raw()) } == 0 {
            return Ok(());
        }
        if unsafe { libc::kill(pid, signal.as_raw()) } == 0 {
            return Ok(());
        }
        Err(io::Error::last_os_error())
    }

    /// Signals are unavailable on this platform.
    #[cfg(not(unix))]
    pub fn signal(&self, _signal: StopSignal) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process signals are only supported on unix",
        ))
    }
}

/// Internal state record for one command session.
#[derive(Debug)]
pub struct CommandKernel {
    session_id: SessionId,
    pid: Option<u32>,
    paths: CapturePaths,
    is_background: bool,
    running: bool,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    err_msg: Option<String>,
    consumed: bool,
    process: Option<ProcessHandle>,
    pending_stop: Option<StopSignal>,
}

impl CommandKernel {
    /// New running kernel, started now.
    pub fn new(session_id: SessionId, paths: CapturePaths, is_background: bool) -> Self {
        Self {
            session_id,
            pid: None,
            paths,
            is_background,
            running: true,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            err_msg: None,
            consumed: false,
            process: None,
            pending_stop: None,
        }
    }

    /// Session identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Pid of the running process, or the last one known after exit.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Capture file locations.
    pub fn paths(&self) -> &CapturePaths {
        &self.paths
    }

    /// File read by output seeks.
    pub fn output_path(&self) -> &Path {
        if self.is_background {
            &self.paths.combined
        } else {
            &self.paths.stdout
        }
    }

    /// Whether the session runs detached.
    pub fn is_background(&self) -> bool {
        self.is_background
    }

    /// Whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// When the session was started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the process finished.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Process exit code.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Failure unrelated to the exit code.
    pub fn err_msg(&self) -> Option<&str> {
        self.err_msg.as_deref()
    }

    /// Whether output has been read past completion.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Attach the spawned process.
    ///
    /// A stop requested before the process was attached is delivered now.
    pub fn attach_process(&mut self, process: ProcessHandle) -> io::Result<()> {
        self.pid = Some(process.pid());
        self.process = Some(process);
        match self.pending_stop.take() {
            Some(signal) => self.signal(signal).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Record completion. Only the first call has an effect.
    ///
    /// Releases the process handle.
    pub fn finish(&mut self, exit_code: Option<i32>, err_msg: Option<String>) {
        if !self.running {
            debug!("Ignoring repeated completion: session={}", self.session_id);
            return;
        }
        self.running = false;
        self.finished_at = Some(Utc::now());
        self.exit_code = exit_code;
        self.err_msg = err_msg;
        self.process = None;
        self.pending_stop = None;
    }

    /// Mark output as read past completion.
    pub fn mark_consumed(&mut self) {
        if !self.running {
            self.consumed = true;
        }
    }

    /// Signal the process if it is still running.
    ///
    /// While the process is being spawned the signal is held and delivered
    /// on attach. Returns whether the signal was delivered or held.
    pub fn signal(&mut self, signal: StopSignal) -> io::Result<bool> {
        if !self.running {
            return Ok(false);
        }
        match &self.process {
            Some(process) => process.signal(signal).map(|()| true),
            None => {
                debug!("Deferring {:?} until spawn: session={}", signal, self.session_id);
                if self.pending_stop != Some(StopSignal::Kill) {
                    self.pending_stop = Some(signal);
                }
                Ok(true)
            }
        }
    }

    /// Stop requested before the process was attached.
    pub fn pending_stop(&self) -> Option<StopSignal> {
        self.pending_stop
    }

    /// Point-in-time status.
    pub fn status(&self) -> CommandStatus {
        CommandStatus {
            session_id: self.session_id.clone(),
            running: self.running,
            exit_code: self.exit_code,
            error: self.err_msg.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::OutputCapture;

    fn kernel(id: &str) -> CommandKernel {
        let id = SessionId::parse(id).unwrap();
        let paths = OutputCapture::new("/scratch").paths(&id);
        CommandKernel::new(id, paths, true)
    }

    #[test]
    fn test_new_kernel_is_running() {
        let kernel = kernel("k1");
        let status = kernel.status();
        assert!(status.running);
        assert_eq!(status.exit_code, None);
        assert_eq!(status.finished_at, None);
        assert_eq!(kernel.pid(), None);
    }

    #[test]
    fn test_finish_sets_fields_once() {
        let mut kernel = kernel("k2");
        kernel.attach_process(ProcessHandle::new(4242)).unwrap();
        assert_eq!(kernel.pid(), Some(4242));

        kernel.finish(Some(0), None);
        let first = kernel.finished_at();
        assert!(!kernel.is_running());
        assert_eq!(kernel.exit_code(), Some(0));
        assert!(first.is_some());

        kernel.finish(Some(9), Some("late".to_string()));
        assert_eq!(kernel.exit_code(), Some(0));
        assert_eq!(kernel.err_msg(), None);
        assert_eq!(kernel.finished_at(), first);
        assert_eq!(kernel.pid(), Some(4242));
    }

    #[test]
    fn test_signal_after_finish_is_noop() {
        let mut kernel = kernel("k3");
        kernel.attach_process(ProcessHandle::new(u32::MAX)).unwrap();
        kernel.finish(None, Some("terminated by signal 15".to_string()));
        assert!(!kernel.signal(StopSignal::Terminate).unwrap());
    }

    #[test]
    fn test_signal_before_attach_is_held() {
        let mut kernel = kernel("k4");
        assert!(kernel.signal(StopSignal::Terminate).unwrap());
        assert_eq!(kernel.pending_stop(), Some(StopSignal::Terminate));

        assert!(kernel.signal(StopSignal::Kill).unwrap());
        assert!(kernel.signal(StopSignal::Terminate).unwrap());
        assert_eq!(kernel.pending_stop(), Some(StopSignal::Kill));

        kernel.finish(None, Some("failed to spawn command".to_string()));
        assert_eq!(kernel.pending_stop(), None);
        assert!(!kernel.signal(StopSignal::Terminate).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_attach_delivers_held_signal() {
        use std::os::unix::process::{CommandExt, ExitStatusExt};

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let mut kernel = kernel("k7");
        kernel.signal(StopSignal::Terminate).unwrap();
        kernel.attach_process(ProcessHandle::new(child.id())).unwrap();
        assert_eq!(kernel.pending_stop(), None);

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn test_mark_consumed_requires_completion() {
        let mut kernel = kernel("k5");
        kernel.mark_consumed();
        assert!(!kernel.is_consumed());

        kernel.finish(Some(1), None);
        kernel.mark_consumed();
        assert!(kernel.is_consumed());
    }

    #[test]
    fn test_output_path_by_mode() {
        let id = SessionId::parse("k6").unwrap();
        let paths = OutputCapture::new("/scratch").paths(&id);
        let background = CommandKernel::new(id.clone(), paths.clone(), true);
        let foreground = CommandKernel::new(id, paths.clone(), false);

        assert_eq!(background.output_path(), paths.combined.as_path());
        assert_eq!(foreground.output_path(), paths.stdout.as_path());
    }
}
