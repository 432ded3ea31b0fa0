//! Well-known per-user locations shared between tmlog processes

use std::path::{Path, PathBuf};

/// Per-user runtime directory for shared state (lock, network state, marker slots)
///
/// Prefers `/dev/shm` so state lives in shared memory, then `XDG_RUNTIME_DIR`,
/// and finally a uid-suffixed directory under `/tmp`.
pub fn state_dir() -> PathBuf {
    let uid = unsafe { libc::getuid() };
    if Path::new("/dev/shm").is_dir() {
        return PathBuf::from(format!("/dev/shm/tmlog-{}", uid));
    }
    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("tmlog");
        }
    }
    PathBuf::from(format!("/tmp/tmlog-{}", uid))
}

/// Default network state file
pub fn net_state_path() -> PathBuf {
    state_dir().join("public_ip")
}

/// Default monitor lock file
pub fn netmon_lock_path() -> PathBuf {
    state_dir().join("netmon.pid")
}

/// Directory holding per-shell open-marker slots
pub fn marker_slot_dir() -> PathBuf {
    state_dir().join("markers")
}

/// Default pane log directory (`~/.tmux/logs`)
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tmux")
        .join("logs")
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Ensure a private (0700) directory exists
pub fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
