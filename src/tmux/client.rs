use anyhow::{Context, Result};
use std::process::Command;

use super::{sanitize_pane_identifier, PANE_LOG_FORMAT};

/// Client for the few tmux queries tmlog needs
#[derive(Debug, Default)]
pub struct TmuxClient;

impl TmuxClient {
    /// Creates a new TmuxClient
    pub fn new() -> Self {
        Self
    }

    /// Expand a tmux format string for the current client
    pub fn display_message(&self, format: &str) -> Result<String> {
        let output = Command::new("tmux")
            .args(["display-message", "-p", format])
            .output()
            .context("Failed to execute tmux display-message")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux display-message failed: {}", stderr);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Log name prefix of the current pane (`session-window-pane-%id`)
    pub fn current_pane_prefix(&self) -> Option<String> {
        match self.display_message(PANE_LOG_FORMAT) {
            Ok(raw) if !raw.is_empty() => Some(sanitize_pane_identifier(&raw)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("No current pane prefix: {}", e);
                None
            }
        }
    }
}
