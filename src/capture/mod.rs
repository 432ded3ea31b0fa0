//! Pane capture with size-based rotation
//!
//! tmux `pipe-pane` feeds a pane's raw output into `tmlog capture`, which
//! appends it to `<log_dir>/<pane>_<start_ts>.log` and rotates the file
//! aside once it grows past the ceiling.

pub mod daemon;
pub mod pane_log;
pub mod rotation;

pub use daemon::{CaptureDaemon, CaptureStats};
pub use pane_log::{log_candidates, read_log, segments, PaneLog};
pub use rotation::{rotate_if_needed, RotationGuard, RotationSignal};
