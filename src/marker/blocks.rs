//! Reconstruct command blocks from a captured pane log

use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::protocol::{scan, Marker, MarkerId};

/// One command recovered from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    pub id: MarkerId,
    pub timestamp: i64,
    pub command: Vec<u8>,
    /// Prompt text drawn before the command (last Prompt marker to Start)
    pub prompt: Option<Range<usize>>,
    /// Command output (Start to End, next Start, next Prompt, or EOF)
    pub output: Range<usize>,
    /// Whether a matching End marker was seen
    pub closed: bool,
}

impl CommandBlock {
    /// Command text for display
    pub fn command_text(&self) -> String {
        String::from_utf8_lossy(&self.command).into_owned()
    }

    /// Raw bytes of prompt and output, skipping the Start marker itself
    pub fn raw(&self, log: &[u8], with_prompt: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if with_prompt {
            if let Some(prompt) = &self.prompt {
                out.extend_from_slice(&log[prompt.clone()]);
            }
        }
        out.extend_from_slice(&log[self.output.clone()]);
        out
    }

    /// Listing entry for display or JSON output
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            id: self.id.to_string(),
            timestamp: self.timestamp,
            command: self.command_text(),
            output_bytes: self.output.len(),
            closed: self.closed,
        }
    }
}

/// Serializable listing entry
#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub id: String,
    pub timestamp: i64,
    pub command: String,
    pub output_bytes: usize,
    pub closed: bool,
}

/// Slice a captured log into command blocks
///
/// End markers whose id does not match the open block are ignored. A Start
/// or Prompt arriving while a block is open closes it as unterminated.
pub fn reconstruct(log: &[u8]) -> Vec<CommandBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<CommandBlock> = None;
    let mut last_prompt_end: Option<usize> = None;

    for scanned in scan(log) {
        match scanned.marker {
            Marker::Start {
                id,
                timestamp,
                command,
            } => {
                if let Some(mut block) = open.take() {
                    block.output.end = scanned.start;
                    blocks.push(block);
                }
                open = Some(CommandBlock {
                    id,
                    timestamp,
                    command,
                    prompt: last_prompt_end.take().map(|p| p..scanned.start),
                    output: scanned.end..scanned.end,
                    closed: false,
                });
            }
            Marker::End { id } => {
                if open.as_ref().is_some_and(|b| b.id == id) {
                    if let Some(mut block) = open.take() {
                        block.output.end = scanned.start;
                        block.closed = true;
                        blocks.push(block);
                    }
                }
            }
            Marker::Prompt => {
                if let Some(mut block) = open.take() {
                    block.output.end = scanned.start;
                    blocks.push(block);
                }
                last_prompt_end = Some(scanned.end);
            }
        }
    }

    if let Some(mut block) = open.take() {
        block.output.end = log.len();
        blocks.push(block);
    }

    blocks
}

/// Find a block by marker id
pub fn find_by_id<'a>(blocks: &'a [CommandBlock], id: &str) -> Option<&'a CommandBlock> {
    blocks.iter().find(|b| b.id.as_str() == id)
}

/// Search `logs` in order for the block with `id`
///
/// Unreadable logs are skipped. On a hit, returns the log it came from,
/// that log's contents and the block.
pub fn search_logs<P: AsRef<Path>>(
    logs: &[P],
    id: &str,
) -> Option<(PathBuf, Vec<u8>, CommandBlock)> {
    for log in logs {
        let log = log.as_ref();
        let data = match crate::capture::read_log(log) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("Skipping {:?}: {:#}", log, e);
                continue;
            }
        };
        if let Some(block) = find_by_id(&reconstruct(&data), id).cloned() {
            return Some((log.to_path_buf(), data, block));
        }
    }
    None
}

/// N-th most recent block (1 = latest)
pub fn nth_latest(blocks: &[CommandBlock], n: usize) -> Option<&CommandBlock> {
    if n == 0 {
        return None;
    }
    blocks.iter().rev().nth(n - 1)
}
