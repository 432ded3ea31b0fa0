//! Singleton ownership token for the network monitor
//!
//! The lock file holds the owner's PID. Acquiring replaces it with ours
//! first, then asks the previous owner to stop and waits for it, so the
//! old instance is gone before the new one writes any state. An exclusive
//! `flock` on a sidecar guard file serializes that sequence, so two
//! instances starting together supersede each other in turn instead of
//! both claiming the same predecessor.

use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::paths;

/// How long a superseded monitor gets to exit after SIGTERM
const TERM_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to prepare lock directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to lock guard file {path:?}: {source}")]
    Guard {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write lock file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("previous monitor (pid {0}) did not exit")]
    Stuck(i32),
}

/// Held lock; released on drop if still ours
#[derive(Debug)]
pub struct MonitorLock {
    path: PathBuf,
    pid: i32,
}

impl MonitorLock {
    /// Acquire, superseding a live `tmlog netmon` holder
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        Self::acquire_with(path, is_monitor_process)
    }

    /// Acquire with a custom check for "this PID is a monitor"
    ///
    /// A live holder that fails `is_monitor` is left alone: its PID was
    /// recycled by an unrelated program.
    pub fn acquire_with<F>(path: &Path, is_monitor: F) -> Result<Self, LockError>
    where
        F: Fn(i32) -> bool,
    {
        let pid = std::process::id() as i32;

        if let Some(dir) = path.parent() {
            paths::ensure_private_dir(dir).map_err(|source| LockError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        // Held until the previous owner is gone
        let _serial = lock_guard(path)?;
        let previous = read_pid(path);
        write_pid_atomic(path, pid).map_err(|source| LockError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(prev) = previous.filter(|&p| p != pid && is_alive(p)) {
            if is_monitor(prev) {
                tracing::info!("Superseding monitor pid {}", prev);
                stop_process(prev)?;
            } else {
                tracing::warn!("Lock named pid {} which is not a monitor; not signalling", prev);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Whether the lock file still names this holder
    pub fn is_held(&self) -> bool {
        read_pid(&self.path) == Some(self.pid)
    }
}

impl Drop for MonitorLock {
    fn drop(&mut self) {
        // A newer instance may already own the file
        if self.is_held() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Sidecar file whose `flock` serializes acquisition
fn guard_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".guard");
    path.with_file_name(name)
}

fn lock_guard(path: &Path) -> Result<Flock<File>, LockError> {
    let guard = guard_path(path);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&guard)
        .map_err(|source| LockError::Guard {
            path: guard.clone(),
            source,
        })?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| LockError::Guard {
        path: guard,
        source: errno.into(),
    })
}

/// PID recorded in a lock file
pub fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn write_pid_atomic(path: &Path, pid: i32) -> std::io::Result<()> {
    let temp_path = path.with_extension(format!("tmp.{}", pid));
    let _ = fs::remove_file(&temp_path);

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    writeln!(file, "{}", pid)?;
    fs::rename(&temp_path, path)
}

/// Live, non-zombie process check
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 || signal::kill(Pid::from_raw(pid), None).is_err() {
        return false;
    }
    // Exited children linger as zombies until reaped
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_none_or(|state| state != "Z"),
        Err(_) => true,
    }
}

/// Whether `pid` runs `tmlog netmon`
pub fn is_monitor_process(pid: i32) -> bool {
    let Ok(raw) = fs::read(format!("/proc/{}/cmdline", pid)) else {
        return false;
    };
    let args: Vec<String> = raw
        .split(|&b| b == 0)
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .collect();

    let is_tmlog = args
        .first()
        .and_then(|exe| Path::new(exe).file_name())
        .is_some_and(|name| name == "tmlog");
    is_tmlog && args.iter().skip(1).any(|a| a == "netmon")
}

fn stop_process(pid: i32) -> Result<(), LockError> {
    let target = Pid::from_raw(pid);
    let _ = signal::kill(target, Signal::SIGTERM);
    if wait_for_exit(pid, TERM_GRACE) {
        return Ok(());
    }

    tracing::warn!("Monitor pid {} ignored SIGTERM, killing", pid);
    let _ = signal::kill(target, Signal::SIGKILL);
    if wait_for_exit(pid, TERM_GRACE) {
        Ok(())
    } else {
        Err(LockError::Stuck(pid))
    }
}

fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !is_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    !is_alive(pid)
}
