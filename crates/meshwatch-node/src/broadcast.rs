//! Broadcast sink: structured event records for external consumers.
//!
//! Events are written as JSON lines (type-tagged, stamped with the
//! dispatch timestamp) into a named pipe read by a separate
//! distribution server. The sink must never stall or fail a cycle: the
//! pipe is opened non-blocking, and when the consumer is gone
//! (`ENXIO` on open, `EPIPE`/`EAGAIN` on write) the sink is marked
//! unavailable and re-opened lazily on the next event.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use meshwatch_types::{MeshwatchError, Result, Timestamp};

// ---------------------------------------------------------------------------
// Record framing
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Record<'a, E: Serialize> {
    /// Unix timestamp of the dispatch.
    ts: i64,
    #[serde(flatten)]
    event: &'a E,
}

// ---------------------------------------------------------------------------
// BroadcastSink
// ---------------------------------------------------------------------------

/// Lazily-connected writer for the broadcast pipe.
pub struct BroadcastSink {
    path: PathBuf,
    writer: Option<File>,
}

impl BroadcastSink {
    /// Creates a sink for `path`. Nothing is opened until the first
    /// event is published.
    pub fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    /// Writes one type-tagged record, stamped with `now`.
    ///
    /// Failures are tolerated by contract: the error is logged, the
    /// sink is marked down, and the next publish retries the open. The
    /// current record is dropped either way.
    pub fn publish<E: Serialize>(&mut self, event: &E, now: Timestamp) {
        let record = Record {
            ts: now.as_unix(),
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(%e, "failed to encode broadcast record");
                return;
            }
        };

        let was_connected = self.writer.is_some();
        if let Err(e) = self.write_line(&line) {
            self.writer = None;
            if was_connected {
                tracing::warn!(%e, "broadcast sink lost, retrying on next event");
            } else {
                tracing::debug!(%e, "broadcast sink unavailable");
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.writer.is_none() {
            self.writer = Some(self.open()?);
        }
        let writer = self.writer.as_mut().ok_or_else(|| MeshwatchError::SinkError {
            reason: "sink not open".into(),
        })?;

        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| MeshwatchError::SinkError {
                reason: format!("write failed: {e}"),
            })
    }

    /// Opens the sink write-only and non-blocking, so a FIFO with no
    /// reader errors out (`ENXIO`) instead of blocking the cycle.
    #[cfg(unix)]
    fn open(&self) -> Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new()
            .write(true)
            .append(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| MeshwatchError::SinkError {
                reason: format!("cannot open {}: {e}", self.path.display()),
            })
    }

    #[cfg(not(unix))]
    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MeshwatchError::SinkError {
                reason: format!("cannot open {}: {e}", self.path.display()),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
