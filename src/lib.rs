//! tmlog - terminal session capture substrate for tmux
//!
//! Three independent pieces cooperate through the filesystem and the shell's
//! own output stream:
//!
//! - [`marker`]: command-boundary markers emitted by shell hooks
//! - [`capture`]: pane pipe capture with size-based log rotation
//! - [`netmon`]: singleton public-address monitor driven by route events

pub mod capture;
pub mod config;
pub mod marker;
pub mod netmon;
pub mod paths;
pub mod shell_init;
pub mod tmux;
