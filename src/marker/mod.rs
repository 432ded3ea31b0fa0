//! Command-boundary marking protocol
//!
//! Shell hooks call [`fire`] on every command submission and prompt redraw.
//! The emitted markers travel through the pane output into the capture log,
//! where [`blocks::reconstruct`] slices them back into commands.

pub mod blocks;
pub mod emitter;
pub mod protocol;
pub mod slot;

pub use blocks::{reconstruct, CommandBlock};
pub use emitter::{IdGenerator, MarkerEmitter};
pub use protocol::{scan, Marker, MarkerId, ScannedMarker};
pub use slot::SessionSlot;

use std::io::Write;
use std::path::Path;

/// A hook trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger<'a> {
    /// Command about to execute
    Exec(&'a [u8]),
    /// Prompt about to render
    Prompt,
}

/// Handle one trigger for `session`, writing markers to `out`
///
/// No-op outside tmux. Never fails: slot problems are logged and the
/// markers are still emitted.
pub fn fire<W: Write>(trigger: Trigger<'_>, session: &str, slot_dir: &Path, out: W) {
    if !crate::tmux::in_tmux() {
        return;
    }
    fire_in_host(trigger, session, slot_dir, out);
}

fn fire_in_host<W: Write>(trigger: Trigger<'_>, session: &str, slot_dir: &Path, out: W) {
    let slot = match SessionSlot::new(slot_dir, session) {
        Ok(slot) => Some(slot),
        Err(e) => {
            tracing::debug!("No session slot: {}", e);
            None
        }
    };

    let mut emitter = MarkerEmitter::with_open(out, slot.as_ref().and_then(|s| s.load()));
    match trigger {
        Trigger::Exec(command) => {
            emitter.command_started(command);
        }
        Trigger::Prompt => emitter.prompt_rendered(),
    }

    if let Some(slot) = slot {
        if let Err(e) = slot.store(emitter.open_marker()) {
            tracing::debug!("Failed to persist marker slot: {}", e);
        }
    }
}
