//! Status queries and cursor-based output reads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::{debug, warn};

use execd_core::{CommandStatus, Error, Result, SessionId};

use crate::engine::ExecutionEngine;
use crate::registry::SessionRegistryExt;

/// Output read from a cursor onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Bytes read, possibly empty
    pub data: Vec<u8>,
    /// Cursor to pass to the next read
    pub cursor: u64,
    /// Whether the command was still running when the read started
    pub running: bool,
}

impl ExecutionEngine {
    /// Snapshot of a session's state.
    pub fn get_status(&self, session_id: &SessionId) -> Result<CommandStatus> {
        self.registry().inspect(session_id, |kernel| kernel.status())
    }

    /// Read a background session's combined output from `cursor` onward.
    ///
    /// Successive calls passing back the returned cursor reproduce the whole
    /// output without gaps or overlap. Once a read happens after the command
    /// finished, the session becomes eligible for retention sweeps.
    pub fn seek_output(&self, session_id: &SessionId, cursor: u64) -> Result<OutputChunk> {
        let (path, running, background): (PathBuf, bool, bool) = self
            .registry()
            .inspect(session_id, |kernel| {
                (
                    kernel.output_path().to_path_buf(),
                    kernel.is_running(),
                    kernel.is_background(),
                )
            })
            .map_err(|_| Error::InvalidRequest(format!("unknown session: {session_id}")))?;

        if !background {
            return Err(Error::InvalidRequest(format!(
                "session {session_id} is not a background command"
            )));
        }

        let mut file = match File::open(&path) {
            Ok(file) => file,
            // Registered but capture files not created yet.
            Err(e) if e.kind() == io::ErrorKind::NotFound && running => {
                return Ok(OutputChunk {
                    data: Vec::new(),
                    cursor,
                    running,
                })
            }
            Err(e) => {
                return Err(Error::Runtime(format!(
                    "failed to open output of {session_id}: {e}"
                )))
            }
        };
        let len = file.metadata()?.len();

        let chunk = if cursor >= len {
            OutputChunk {
                data: Vec::new(),
                cursor,
                running,
            }
        } else {
            file.seek(SeekFrom::Start(cursor))?;
            let mut data = Vec::new();
            let read = file.read_to_end(&mut data)?;
            OutputChunk {
                data,
                cursor: cursor + read as u64,
                running,
            }
        };
        debug!(
            "Output seek: session={}, cursor={} -> {}",
            session_id, cursor, chunk.cursor
        );

        if !running {
            if let Err(e) = self.registry().modify(session_id, |kernel| kernel.mark_consumed()) {
                warn!("Failed to mark output consumed: {}", e);
            }
        }
        Ok(chunk)
    }
}
