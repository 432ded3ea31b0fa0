//! Size-based rotation running beside the capture loop
//!
//! The checker renames, then leaves an empty file under the active name.
//! The writer keeps appending through its open handle (bytes land in the
//! backup) until it sees the reopen flag, so no byte is lost, duplicated,
//! or truncated mid-write.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::pane_log::PaneLog;

/// Rename the active log to a backup if it exceeds `max_size_bytes`
///
/// Returns the backup path when a rotation happened. The active path is
/// recreated empty right away so the pane always has a current log. A
/// missing active file is not an error.
pub fn rotate_if_needed(log: &PaneLog, max_size_bytes: u64) -> std::io::Result<Option<PathBuf>> {
    let len = match fs::metadata(log.path()) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if len <= max_size_bytes {
        return Ok(None);
    }

    let backup = log.backup_path(chrono::Utc::now().timestamp());
    fs::rename(log.path(), &backup)?;
    if let Err(e) = OpenOptions::new().create(true).append(true).open(log.path()) {
        // The writer's reopen creates it on the next chunk
        tracing::warn!("Failed to recreate {:?}: {}", log.path(), e);
    }
    Ok(Some(backup))
}

/// Handle shared between the checker thread and the writer
#[derive(Debug, Clone, Default)]
pub struct RotationSignal {
    reopen: Arc<AtomicBool>,
    rotations: Arc<AtomicU64>,
}

impl RotationSignal {
    /// True once per rotation; the writer must reopen the active path
    pub fn take_reopen(&self) -> bool {
        self.reopen.swap(false, Ordering::AcqRel)
    }

    /// Number of rotations so far
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    fn notify(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        self.reopen.store(true, Ordering::Release);
    }
}

/// Periodic size checker bound to a scope
///
/// Dropping the guard stops and joins the thread, so the checker never
/// outlives the capture loop on any exit path, unwinding included.
pub struct RotationGuard {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RotationGuard {
    /// Start checking `log` every `interval`
    pub fn spawn(
        log: PaneLog,
        max_size_bytes: u64,
        interval: Duration,
        signal: RotationSignal,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("tmlog-rotation".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Stop requested or guard dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                match rotate_if_needed(&log, max_size_bytes) {
                    Ok(Some(backup)) => {
                        tracing::info!("Rotated {:?} -> {:?}", log.path(), backup);
                        signal.notify();
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Rotation check failed for {:?}: {}", log.path(), e),
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for RotationGuard {
    fn drop(&mut self) {
        // Closing the channel wakes the checker immediately
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Rotation checker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn log_with_size(dir: &std::path::Path, size: usize) -> PaneLog {
        let log = PaneLog::create(dir, "p", 1).unwrap();
        fs::write(log.path(), vec![b'x'; size]).unwrap();
        log
    }

    #[test]
    fn test_file_at_ceiling_is_not_rotated() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_with_size(tmp.path(), 1024);
        assert_eq!(rotate_if_needed(&log, 1024).unwrap(), None);
        assert_eq!(rotate_if_needed(&log, 1025).unwrap(), None);
        assert!(log.path().exists());
    }

    #[test]
    fn test_file_over_ceiling_is_rotated() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_with_size(tmp.path(), 1025);
        let backup = rotate_if_needed(&log, 1024).unwrap().expect("should rotate");
        assert_eq!(fs::metadata(log.path()).unwrap().len(), 0);
        assert_eq!(fs::metadata(&backup).unwrap().len(), 1025);
        assert!(backup.to_string_lossy().ends_with(".bak"));
    }

    #[test]
    fn test_missing_active_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PaneLog::create(tmp.path(), "p", 1).unwrap();
        assert_eq!(rotate_if_needed(&log, 0).unwrap(), None);
    }

    #[test]
    fn test_guard_rotates_and_signals() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_with_size(tmp.path(), 64);
        let signal = RotationSignal::default();

        let guard = RotationGuard::spawn(
            log.clone(),
            10,
            Duration::from_millis(10),
            signal.clone(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while signal.rotations() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        drop(guard);

        assert_eq!(signal.rotations(), 1);
        assert!(signal.take_reopen());
        assert!(!signal.take_reopen());
        // Fresh empty log stays below the ceiling
        assert_eq!(fs::metadata(log.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_guard_drop_is_prompt() {
        let tmp = tempfile::tempdir().unwrap();
        let log = PaneLog::create(tmp.path(), "p", 1).unwrap();
        let guard = RotationGuard::spawn(
            log,
            10,
            Duration::from_secs(3600),
            RotationSignal::default(),
        )
        .unwrap();

        let started = Instant::now();
        drop(guard);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
