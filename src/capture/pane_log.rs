//! Pane log naming and rotated-sibling discovery

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOG_EXTENSION: &str = "log";
const BACKUP_SUFFIX: &str = "bak";

/// The active log of one pane's capture segment
///
/// Named `<dir>/<pane>_<start_ts>.log`; rotated copies become
/// `<dir>/<pane>_<start_ts>.log.<rotation_ts>.bak`.
#[derive(Debug, Clone)]
pub struct PaneLog {
    dir: PathBuf,
    stem: String,
    path: PathBuf,
}

impl PaneLog {
    /// Prepare the log for `pane` started at `started` (unix seconds)
    ///
    /// Creates the directory; failure here is fatal for the daemon.
    pub fn create(dir: &Path, pane: &str, started: i64) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;

        let stem = format!("{}_{}", pane, started);
        let path = dir.join(format!("{}.{}", stem, LOG_EXTENSION));
        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            path,
        })
    }

    /// Path of the active log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<pane>_<start_ts>`
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Open (creating if needed) the active log for appending
    pub fn open_append(&self) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    /// First unused backup name at or after `rotated_at`
    pub fn backup_path(&self, rotated_at: i64) -> PathBuf {
        let mut ts = rotated_at;
        loop {
            let candidate = self
                .dir
                .join(format!("{}.{}.{}.{}", self.stem, LOG_EXTENSION, ts, BACKUP_SUFFIX));
            if !candidate.exists() {
                return candidate;
            }
            ts += 1;
        }
    }

    /// Every segment of this log in write order
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        segments(&self.dir, &self.stem)
    }
}

/// Rotated backups of `<stem>.log` in rotation order, then the active file
pub fn segments(dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let active_name = format!("{}.{}", stem, LOG_EXTENSION);
    let backup_prefix = format!("{}.", active_name);

    let mut backups: Vec<(i64, PathBuf)> = Vec::new();
    let mut active = None;

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read log directory: {:?}", dir))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name == active_name {
            active = Some(entry.path());
        } else if let Some(rest) = name.strip_prefix(&backup_prefix) {
            let ts = rest
                .strip_suffix(&format!(".{}", BACKUP_SUFFIX))
                .and_then(|ts| ts.parse::<i64>().ok());
            if let Some(ts) = ts {
                backups.push((ts, entry.path()));
            }
        }
    }

    backups.sort_by_key(|(ts, _)| *ts);
    let mut ordered: Vec<PathBuf> = backups.into_iter().map(|(_, p)| p).collect();
    ordered.extend(active);
    Ok(ordered)
}

/// Contents of a pane log and its rotated backups, oldest first
///
/// Anything other than an active `*.log` is read as a single file.
pub fn read_log(path: &Path) -> Result<Vec<u8>> {
    let parts = match (path.parent(), path.file_stem().and_then(|s| s.to_str())) {
        (Some(dir), Some(stem)) if path.extension().is_some_and(|e| e == LOG_EXTENSION) => {
            segments(dir, stem)?
        }
        _ => vec![path.to_path_buf()],
    };

    let mut data = Vec::new();
    for part in parts {
        let bytes = fs::read(&part).with_context(|| format!("Failed to read log: {:?}", part))?;
        data.extend_from_slice(&bytes);
    }
    Ok(data)
}

/// Active `*.log` files in `dir`, newest first, `prefix` matches first
pub fn log_candidates(dir: &Path, prefix: Option<&str>) -> Vec<PathBuf> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = read_dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == LOG_EXTENSION))
        .map(|p| {
            let mtime = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (mtime, p)
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let paths = entries.into_iter().map(|(_, p)| p);
    match prefix {
        Some(prefix) => {
            let (matches, others): (Vec<_>, Vec<_>) = paths.partition(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            });
            matches.into_iter().chain(others).collect()
        }
        None => paths.collect(),
    }
}
