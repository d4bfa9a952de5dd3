//! Per-session output capture files.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use execd_core::{ExecMode, Result, SessionId};

/// Locations of a session's captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePaths {
    /// Foreground stdout capture
    pub stdout: PathBuf,
    /// Foreground stderr capture
    pub stderr: PathBuf,
    /// Background capture holding both streams
    pub combined: PathBuf,
}

impl CapturePaths {
    fn all(&self) -> [&Path; 3] {
        [&self.stdout, &self.stderr, &self.combined]
    }
}

/// Write handles to pass to a spawned process.
#[derive(Debug)]
pub struct CaptureFiles {
    /// Handle for the process stdout
    pub stdout: File,
    /// Handle for the process stderr
    pub stderr: File,
}

/// Creates capture files under a scratch directory.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    dir: PathBuf,
}

impl OutputCapture {
    /// Capture into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding capture files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic capture paths for a session.
    pub fn paths(&self, session_id: &SessionId) -> CapturePaths {
        CapturePaths {
            stdout: self.dir.join(format!("{session_id}.stdout")),
            stderr: self.dir.join(format!("{session_id}.stderr")),
            combined: self.dir.join(format!("{session_id}.output")),
        }
    }

    /// Create (or truncate) the capture files for a session.
    ///
    /// Foreground sessions get separate stdout/stderr files; background
    /// sessions share one combined file between both streams.
    pub fn open(&self, session_id: &SessionId, mode: ExecMode) -> Result<CaptureFiles> {
        std::fs::create_dir_all(&self.dir)?;
        let paths = self.paths(session_id);

        let files = if mode.is_background() {
            let stdout = create_truncate(&paths.combined)?;
            let stderr = stdout.try_clone()?;
            CaptureFiles { stdout, stderr }
        } else {
            CaptureFiles {
                stdout: create_truncate(&paths.stdout)?,
                stderr: create_truncate(&paths.stderr)?,
            }
        };

        debug!("Opened capture files: session={}, mode={:?}", session_id, mode);
        Ok(files)
    }

    /// Delete a session's capture files. Missing files are ignored.
    pub fn remove(&self, paths: &CapturePaths) -> io::Result<()> {
        let mut first_err = None;
        for path in paths.all() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove capture file {}: {}", path.display(), e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn create_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
