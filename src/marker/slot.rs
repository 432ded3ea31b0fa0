//! Per-shell open-marker slot
//!
//! Each hook invocation is a separate process, so the session's open marker
//! id is carried between preexec and precmd in `<dir>/<session>.open`.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::protocol::MarkerId;
use crate::paths;

/// Slot file for one shell session
#[derive(Debug)]
pub struct SessionSlot {
    path: PathBuf,
}

impl SessionSlot {
    /// Slot for `session` (typically the shell PID) under `dir`
    ///
    /// Only alphanumeric, `-` and `_` are accepted so the key cannot
    /// escape the directory.
    pub fn new(dir: &Path, session: &str) -> Result<Self> {
        if session.is_empty() {
            bail!("Session key cannot be empty");
        }
        if !session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("Invalid session key: '{}'", session);
        }

        Ok(Self {
            path: dir.join(format!("{}.open", session)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the open marker, if one is recorded
    pub fn load(&self) -> Option<MarkerId> {
        let raw = fs::read_to_string(&self.path).ok()?;
        MarkerId::parse(&raw)
    }

    /// Record `open` as the session's open marker, or clear the slot
    pub fn store(&self, open: Option<&MarkerId>) -> Result<()> {
        let Some(id) = open else {
            return self.clear();
        };

        if let Some(dir) = self.path.parent() {
            paths::ensure_private_dir(dir)
                .with_context(|| format!("Failed to create slot directory: {:?}", dir))?;
        }

        // Write atomically using temp file
        let temp_path = self.path.with_extension("tmp");
        let _ = fs::remove_file(&temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp slot file: {:?}", temp_path))?;
        file.write_all(id.as_str().as_bytes())
            .with_context(|| format!("Failed to write temp slot file: {:?}", temp_path))?;

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename slot file: {:?}", self.path))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove slot file: {:?}", self.path)),
        }
    }
}
