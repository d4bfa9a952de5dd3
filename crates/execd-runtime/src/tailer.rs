//! Incremental tailing of a growing capture file.
//!
//! Records are split on `\n` or `\r`, with `\r\n` counted as one delimiter.
//! A trailing record without a delimiter is held back until the final drain,
//! so progress output that rewrites a line with `\r` still arrives in order
//! and nothing is emitted twice.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Default poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default record cap.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 5 * 1024 * 1024;

/// A failed read cycle. The offset is left where it was.
#[derive(Debug, Error)]
pub enum TailError {
    /// File missing or unreadable
    #[error("tail read failed: {0}")]
    Io(#[from] io::Error),

    /// A record grew past the cap without a delimiter
    #[error("record exceeds {limit} bytes")]
    RecordTooLong {
        /// Configured cap
        limit: usize,
    },
}

/// Tails a single file from a byte offset.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    offset: u64,
    max_record_bytes: usize,
}

impl Tailer {
    /// Tail `path` from its beginning.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }

    /// Override the record cap.
    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    /// File being tailed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Emit every complete record appended since the last successful read.
    pub fn poll<F: FnMut(&str)>(&mut self, on_record: F) -> Result<usize, TailError> {
        self.read(false, on_record)
    }

    /// Emit everything left, including a final record without delimiter.
    ///
    /// Call once the file will not grow any further.
    pub fn drain<F: FnMut(&str)>(&mut self, on_record: F) -> Result<usize, TailError> {
        self.read(true, on_record)
    }

    fn read<F: FnMut(&str)>(&mut self, at_eof: bool, mut on_record: F) -> Result<usize, TailError> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let (records, consumed) = split_records(&buf, at_eof, self.max_record_bytes)?;
        for record in &records {
            on_record(&String::from_utf8_lossy(record));
        }
        self.offset += consumed as u64;
        Ok(records.len())
    }

    /// Poll until `still_growing` turns false, then drain once.
    ///
    /// Failed cycles are logged and retried on the next tick. Returns the
    /// final offset.
    pub async fn follow<P, F>(mut self, interval: Duration, still_growing: P, mut on_record: F) -> u64
    where
        P: Fn() -> bool,
        F: FnMut(&str),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if !still_growing() {
                if let Err(e) = self.drain(&mut on_record) {
                    warn!("Final drain of {} failed: {}", self.path.display(), e);
                }
                return self.offset;
            }

            if let Err(e) = self.poll(&mut on_record) {
                debug!("Tail of {} stalled at {}: {}", self.path.display(), self.offset, e);
            }
        }
    }
}

/// Split `buf` into records and report how many bytes they consumed.
///
/// Without `at_eof`, a trailing partial record (or a lone trailing `\r`
/// that may still be followed by `\n`) is left unconsumed.
fn split_records(buf: &[u8], at_eof: bool, limit: usize) -> Result<(Vec<&[u8]>, usize), TailError> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < buf.len() {
        let advance = match buf[i] {
            b'\n' => 1,
            b'\r' if i + 1 < buf.len() => {
                if buf[i + 1] == b'\n' {
                    2
                } else {
                    1
                }
            }
            b'\r' if at_eof => 1,
            b'\r' => break,
            _ => {
                i += 1;
                continue;
            }
        };

        if i - start > limit {
            return Err(TailError::RecordTooLong { limit });
        }
        records.push(&buf[start..i]);
        i += advance;
        start = i;
    }

    let rest = &buf[start..];
    if rest.len() > limit {
        return Err(TailError::RecordTooLong { limit });
    }
    if at_eof && !rest.is_empty() {
        records.push(rest);
        start = buf.len();
    }

    Ok((records, start))
}
