//! Integration snippets printed by `tmlog init`

use crate::config::{InitTarget, Settings};
use crate::tmux::PANE_LOG_FORMAT;

const ZSH_HOOKS: &str = r#"# tmlog: command-boundary markers for pane capture
if [[ -n "$TMUX" ]] && (( $+commands[tmlog] )); then
  _tmlog_preexec() { command tmlog mark exec --session $$ -- "$1" 2>/dev/null }
  _tmlog_precmd() { command tmlog mark prompt --session $$ 2>/dev/null }
  autoload -Uz add-zsh-hook
  add-zsh-hook preexec _tmlog_preexec
  add-zsh-hook precmd _tmlog_precmd
fi
"#;

/// Render the snippet for `target`
pub fn render(target: InitTarget, settings: &Settings) -> String {
    match target {
        InitTarget::Zsh => ZSH_HOOKS.to_string(),
        InitTarget::Tmux => tmux_conf(settings),
    }
}

fn tmux_conf(settings: &Settings) -> String {
    let log_dir = shell_quote(&settings.capture.log_dir.display().to_string());
    let pipe = format!(
        "pipe-pane -o \"exec tmlog capture {} '{}'\"",
        log_dir, PANE_LOG_FORMAT
    );
    let state = shell_quote(&settings.netmon.state_path().display().to_string());

    let mut out = String::from("# tmlog: capture every pane and track the public address\n");
    for hook in ["after-new-session", "after-new-window", "after-split-window"] {
        out.push_str(&format!("set-hook -g {} '{}'\n", hook, pipe.replace('\'', "'\\''")));
    }
    out.push_str("run-shell -b 'tmlog netmon >/dev/null 2>&1'\n");
    out.push_str(&format!(
        "set -ag status-right ' #(cat {} 2>/dev/null)'\n",
        state.replace('\'', "'\\''")
    ));
    out
}

/// Single-quote for /bin/sh unless the value is plainly safe
fn shell_quote(value: &str) -> String {
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-~%+=".contains(c));
    if safe && !value.is_empty() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_zsh_hooks_call_both_triggers() {
        let out = render(InitTarget::Zsh, &Settings::default());
        assert!(out.contains("tmlog mark exec --session $$ -- \"$1\""));
        assert!(out.contains("tmlog mark prompt --session $$"));
        assert!(out.contains("add-zsh-hook preexec"));
        assert!(out.contains("add-zsh-hook precmd"));
    }

    #[test]
    fn test_tmux_conf_pipes_panes() {
        let mut settings = Settings::default();
        settings.capture.log_dir = PathBuf::from("/home/me/.tmux/logs");
        settings.netmon.state_file = Some(PathBuf::from("/dev/shm/ip"));

        let out = render(InitTarget::Tmux, &settings);
        assert!(out.contains("set-hook -g after-split-window"));
        assert!(out.contains("tmlog capture /home/me/.tmux/logs"));
        assert!(out.contains("#S-#W-#P-#D"));
        assert!(out.contains("tmlog netmon"));
        assert!(out.contains("cat /dev/shm/ip"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/logs"), "/tmp/logs");
        assert_eq!(shell_quote("/tmp/my logs"), "'/tmp/my logs'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
