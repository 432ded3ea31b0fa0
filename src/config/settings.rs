use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::paths;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal session capture for tmux")]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture a pane's output pipe (stdin) into a rotating log file
    Capture {
        /// Directory for pane logs (default: ~/.tmux/logs)
        log_dir: Option<PathBuf>,

        /// Pane identifier used in the log file name (default: $TMUX_PANE)
        pane: Option<String>,

        /// Rotate when the log grows beyond this many bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Seconds between rotation checks
        #[arg(long)]
        check_interval: Option<u64>,
    },
    /// Emit a command-boundary marker (called from shell hooks)
    Mark {
        #[command(subcommand)]
        trigger: MarkTrigger,
    },
    /// Run the network state monitor (supersedes a running instance)
    Netmon {
        /// Print the current network state and exit
        #[arg(long)]
        status: bool,
    },
    /// List command blocks recorded in a pane log
    List {
        /// Log file, `-` for stdin (default: newest log for the current pane)
        log: Option<PathBuf>,

        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Write the raw output of one command block to stdout
    Show {
        /// Log file, `-` for stdin (default: newest log for the current pane,
        /// or every pane log when searching by --id)
        log: Option<PathBuf>,

        /// Marker ID of the command
        #[arg(long, conflicts_with = "last")]
        id: Option<String>,

        /// N-th most recent command (1 = latest)
        #[arg(long)]
        last: Option<usize>,
    },
    /// Print integration snippets for the shell or tmux
    Init {
        /// Integration target
        #[arg(value_enum)]
        target: InitTarget,
    },
}

/// Marker triggers fired by shell hooks
#[derive(Subcommand, Debug, Clone)]
pub enum MarkTrigger {
    /// A command is about to execute
    Exec {
        /// Session key (the shell's PID)
        #[arg(long)]
        session: String,

        /// Command line as typed
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// The prompt is about to render
    Prompt {
        /// Session key (the shell's PID)
        #[arg(long)]
        session: String,
    },
}

/// Integration snippet targets
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitTarget {
    Zsh,
    Tmux,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Pane capture settings
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Network monitor settings
    #[serde(default)]
    pub netmon: NetmonSettings,
}

/// Pane capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Directory for pane logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Rotate once the active log exceeds this size
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,

    /// Seconds between rotation checks
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_log_dir() -> PathBuf {
    paths::default_log_dir()
}

/// Default max log size (10MB)
fn default_max_size() -> u64 {
    10_485_760
}

fn default_check_interval() -> u64 {
    60
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            max_size_bytes: default_max_size(),
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Network monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetmonSettings {
    /// Override for the network state file
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Override for the lock file
    #[serde(default)]
    pub lock_file: Option<PathBuf>,

    /// Minimum seconds between event-triggered resolutions
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,

    /// Delay before resolving, letting the routing table settle
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// DNS side-channel resolver
    #[serde(default)]
    pub dns: DnsSettings,

    /// HTTPS endpoint returning the public address as plain text
    #[serde(default = "default_http_fallback")]
    pub http_fallback: Option<String>,

    /// Timeout for the HTTPS fallback in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_debounce() -> u64 {
    2
}

fn default_settle() -> u64 {
    1000
}

fn default_http_fallback() -> Option<String> {
    Some("https://api.ipify.org".to_string())
}

fn default_http_timeout() -> u64 {
    3
}

impl Default for NetmonSettings {
    fn default() -> Self {
        Self {
            state_file: None,
            lock_file: None,
            debounce_secs: default_debounce(),
            settle_ms: default_settle(),
            dns: DnsSettings::default(),
            http_fallback: default_http_fallback(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl NetmonSettings {
    /// Effective network state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .as_deref()
            .map(paths::expand_home)
            .unwrap_or_else(paths::net_state_path)
    }

    /// Effective lock file path
    pub fn lock_path(&self) -> PathBuf {
        self.lock_file
            .as_deref()
            .map(paths::expand_home)
            .unwrap_or_else(paths::netmon_lock_path)
    }
}

/// DNS side-channel settings (`dig +short <query> @<server>`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsSettings {
    /// Resolver that answers with the client's address
    #[serde(default = "default_dns_server")]
    pub server: String,

    /// Magic name to query
    #[serde(default = "default_dns_query")]
    pub query: String,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,

    /// Number of attempts
    #[serde(default = "default_dns_tries")]
    pub tries: u32,
}

fn default_dns_server() -> String {
    "resolver1.opendns.com".to_string()
}

fn default_dns_query() -> String {
    "myip.opendns.com".to_string()
}

fn default_dns_timeout() -> u64 {
    2
}

fn default_dns_tries() -> u32 {
    2
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            server: default_dns_server(),
            query: default_dns_query(),
            timeout_secs: default_dns_timeout(),
            tries: default_dns_tries(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("tmlog/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/tmlog/config.toml")),
            dirs::home_dir().map(|p| p.join(".tmlog.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        Ok(Self::default())
    }

    /// Like [`Settings::load`], but a broken config file yields the defaults
    pub fn load_or_default(path: Option<&PathBuf>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config: {:#}", e);
            Self::default()
        })
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Command::Capture {
            log_dir,
            max_size,
            check_interval,
            ..
        } = &cli.command
        {
            if let Some(dir) = log_dir {
                self.capture.log_dir = dir.clone();
            }
            if let Some(max_size) = max_size {
                self.capture.max_size_bytes = *max_size;
            }
            if let Some(interval) = check_interval {
                self.capture.check_interval_secs = *interval;
            }
        }
    }

    /// Validate and normalize settings values
    ///
    /// Clamps intervals and sizes to sane minimums and expands `~/` paths.
    pub fn validate(&mut self) {
        const MIN_CHECK_INTERVAL: u64 = 1;
        const MIN_DNS_TIMEOUT: u64 = 1;

        self.capture.log_dir = paths::expand_home(&self.capture.log_dir);
        if self.capture.check_interval_secs < MIN_CHECK_INTERVAL {
            self.capture.check_interval_secs = MIN_CHECK_INTERVAL;
        }
        if self.capture.max_size_bytes == 0 {
            self.capture.max_size_bytes = default_max_size();
        }
        if self.netmon.dns.timeout_secs < MIN_DNS_TIMEOUT {
            self.netmon.dns.timeout_secs = MIN_DNS_TIMEOUT;
        }
        if self.netmon.dns.tries == 0 {
            self.netmon.dns.tries = 1;
        }
        if self.netmon.http_timeout_secs == 0 {
            self.netmon.http_timeout_secs = default_http_timeout();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.capture.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.capture.check_interval_secs, 60);
        assert_eq!(settings.netmon.debounce_secs, 2);
        assert_eq!(settings.netmon.dns.query, "myip.opendns.com");
        assert!(settings.capture.log_dir.ends_with(".tmux/logs"));
    }

    #[test]
    fn test_broken_config_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[capture\nmax_size_bytes = ").unwrap();

        assert!(Settings::load(Some(&path)).is_err());
        let settings = Settings::load_or_default(Some(&path));
        assert_eq!(settings.capture.max_size_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.capture.check_interval_secs, 60);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [capture]
            max_size_bytes = 2048
            check_interval_secs = 5

            [netmon]
            settle_ms = 0
            http_fallback = "https://example.invalid/ip"

            [netmon.dns]
            tries = 3
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.capture.max_size_bytes, 2048);
        assert_eq!(settings.capture.check_interval_secs, 5);
        assert_eq!(settings.netmon.settle_ms, 0);
        assert_eq!(settings.netmon.dns.tries, 3);
        assert_eq!(settings.netmon.dns.server, "resolver1.opendns.com");
        assert_eq!(
            settings.netmon.http_fallback.as_deref(),
            Some("https://example.invalid/ip")
        );
    }

    #[test]
    fn test_merge_cli_capture_overrides() {
        let cli = Config::parse_from([
            "tmlog",
            "capture",
            "/tmp/panes",
            "main-zsh-0",
            "--max-size",
            "100",
        ]);
        let mut settings = Settings::default();
        settings.merge_cli(&cli);
        assert_eq!(settings.capture.log_dir, PathBuf::from("/tmp/panes"));
        assert_eq!(settings.capture.max_size_bytes, 100);
        assert_eq!(settings.capture.check_interval_secs, 60);
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = Settings::default();
        settings.capture.check_interval_secs = 0;
        settings.capture.max_size_bytes = 0;
        settings.netmon.dns.tries = 0;
        settings.validate();
        assert_eq!(settings.capture.check_interval_secs, 1);
        assert_eq!(settings.capture.max_size_bytes, 10_485_760);
        assert_eq!(settings.netmon.dns.tries, 1);
    }

    #[test]
    fn test_mark_exec_keeps_hyphenated_command() {
        let cli = Config::parse_from([
            "tmlog", "mark", "exec", "--session", "42", "--", "ls", "-la",
        ]);
        match cli.command {
            Command::Mark {
                trigger: MarkTrigger::Exec { session, command },
            } => {
                assert_eq!(session, "42");
                assert_eq!(command, vec!["ls", "-la"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
