//! Capture loop: pane pipe -> append-only log

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use super::pane_log::PaneLog;
use super::rotation::{RotationGuard, RotationSignal};

/// Read size per syscall; each chunk is written straight through
const CHUNK_SIZE: usize = 64 * 1024;

/// Totals reported when the pipe closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub bytes_read: u64,
    pub bytes_lost: u64,
    pub rotations: u64,
}

/// Capture-rotation daemon for one pane
pub struct CaptureDaemon {
    log: PaneLog,
    max_size_bytes: u64,
    check_interval: Duration,
}

impl CaptureDaemon {
    pub fn new(log: PaneLog, max_size_bytes: u64, check_interval: Duration) -> Self {
        Self {
            log,
            max_size_bytes,
            check_interval,
        }
    }

    /// Copy `input` into the log until the pipe closes
    ///
    /// Only failing to open the log up front is an error. After that, write
    /// problems are logged and retried so the stream keeps flowing.
    pub fn run<R: Read>(self, mut input: R) -> Result<CaptureStats> {
        let mut file = self
            .log
            .open_append()
            .with_context(|| format!("Failed to open pane log: {:?}", self.log.path()))?;

        tracing::info!("Capturing into {:?}", self.log.path());

        let signal = RotationSignal::default();
        let _guard = RotationGuard::spawn(
            self.log.clone(),
            self.max_size_bytes,
            self.check_interval,
            signal.clone(),
        )
        .context("Failed to start rotation checker")?;

        let mut stats = CaptureStats::default();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break, // Pipe closed
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Pane pipe read error: {}", e);
                    break;
                }
            };
            stats.bytes_read += n as u64;

            if signal.take_reopen() {
                self.reopen(&mut file);
            }
            let lost = write_with_retry(&mut file, &buf[..n], |f| self.reopen(f));
            stats.bytes_lost += lost as u64;
        }

        if let Err(e) = file.sync_data() {
            tracing::debug!("Final sync failed: {}", e);
        }
        stats.rotations = signal.rotations();
        tracing::info!(
            "Pane pipe closed: {} bytes, {} rotations",
            stats.bytes_read,
            stats.rotations
        );
        Ok(stats)
    }

    /// Switch to a fresh handle on the active path; keep the old one on failure
    fn reopen(&self, file: &mut File) {
        match self.log.open_append() {
            Ok(fresh) => *file = fresh,
            Err(e) => tracing::warn!("Failed to reopen {:?}: {}", self.log.path(), e),
        }
    }
}

/// Write `chunk`, reopening once on failure and resending only the unwritten tail
///
/// Returns the number of bytes that could not be written.
fn write_with_retry<W: Write>(out: &mut W, chunk: &[u8], reopen: impl FnOnce(&mut W)) -> usize {
    let written = match write_tracked(out, chunk) {
        Ok(()) => return 0,
        Err((written, e)) => {
            tracing::warn!("Pane log write failed after {} bytes: {}", written, e);
            written
        }
    };

    reopen(out);
    let tail = &chunk[written..];
    match write_tracked(out, tail) {
        Ok(()) => 0,
        Err((more, e)) => {
            let lost = tail.len() - more;
            tracing::warn!("Dropped {} bytes: {}", lost, e);
            lost
        }
    }
}

/// `write_all` that reports how far it got before failing
fn write_tracked<W: Write>(out: &mut W, buf: &[u8]) -> Result<(), (usize, io::Error)> {
    let mut written = 0;
    while written < buf.len() {
        match out.write(&buf[written..]) {
            Ok(0) => return Err((written, ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}
