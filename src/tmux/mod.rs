//! tmux host detection and pane identification

mod client;

pub use client::TmuxClient;

/// tmux format producing the pane prefix used in log file names
pub const PANE_LOG_FORMAT: &str = "#S-#W-#P-#D";

/// Check whether the current process runs inside a tmux pane
pub fn in_tmux() -> bool {
    std::env::var_os("TMUX").is_some_and(|v| !v.is_empty())
}

/// Pane identifier from the environment
///
/// `TMUX_PANE` is like "%0", "%1"; the leading `%` is dropped.
/// Falls back to "unknown" outside tmux.
pub fn pane_id_from_env() -> String {
    match std::env::var("TMUX_PANE") {
        Ok(pane) if !pane.trim_start_matches('%').is_empty() => {
            pane.trim_start_matches('%').to_string()
        }
        _ => "unknown".to_string(),
    }
}

/// Make a pane identifier safe for use as a file name component
///
/// Path separators become `-` and whitespace becomes `_`, matching how
/// session and window names are flattened into log names.
pub fn sanitize_pane_identifier(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unknown".to_string()
    } else {
        cleaned
    }
}
