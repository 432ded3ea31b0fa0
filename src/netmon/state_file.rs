//! Network state record shared with status-line tooling
//!
//! A single line: a dotted-decimal address, `Retrying...` or `Offline`.

use anyhow::{Context, Result};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::paths;

const RETRYING: &str = "Retrying...";
const OFFLINE: &str = "Offline";

/// Current public reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
    /// Resolved public address
    Address(Ipv4Addr),
    /// A default route exists but resolution failed; expect self-correction
    Retrying,
    /// No default route; nothing to do until connectivity returns
    Offline,
}

impl NetState {
    /// Parse the on-disk form
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            RETRYING => Some(NetState::Retrying),
            OFFLINE => Some(NetState::Offline),
            other => other.parse().ok().map(NetState::Address),
        }
    }
}

impl fmt::Display for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetState::Address(addr) => write!(f, "{}", addr),
            NetState::Retrying => f.write_str(RETRYING),
            NetState::Offline => f.write_str(OFFLINE),
        }
    }
}

/// The well-known state file
#[derive(Debug, Clone)]
pub struct NetStateFile {
    path: PathBuf,
}

impl NetStateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the record atomically
    ///
    /// Readers see either the previous line or the new one, never a mix.
    pub fn write(&self, state: NetState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            paths::ensure_private_dir(dir)
                .with_context(|| format!("Failed to create state directory: {:?}", dir))?;
        }

        let temp_path = self.path.with_extension("tmp");
        let _ = fs::remove_file(&temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp state file: {:?}", temp_path))?;
        writeln!(file, "{}", state)
            .with_context(|| format!("Failed to write temp state file: {:?}", temp_path))?;

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename state file: {:?}", self.path))?;
        Ok(())
    }

    /// Read the current record
    pub fn read(&self) -> Result<NetState> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {:?}", self.path))?;
        NetState::parse(&content)
            .with_context(|| format!("Unrecognized network state: {:?}", content.trim()))
    }
}
