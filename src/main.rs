use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tmlog::capture::{self, CaptureDaemon, PaneLog};
use tmlog::config::{Command, Config, MarkTrigger, Settings};
use tmlog::marker::{self, blocks, CommandBlock, Trigger};
use tmlog::tmux::{self, TmuxClient};
use tmlog::{netmon, paths, shell_init};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Hooks run on every prompt: no config and no async runtime
    if let Command::Mark { trigger } = &cli.command {
        mark(trigger);
        return Ok(());
    }

    // Load settings; a pane pipe must keep capturing despite a broken config
    let mut settings = match cli.command {
        Command::Capture { .. } => Settings::load_or_default(cli.config.as_ref()),
        _ => Settings::load(cli.config.as_ref())?,
    };
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command {
        Command::Capture { pane, .. } => capture(&settings, pane),
        Command::Mark { .. } => Ok(()),
        Command::Netmon { status: true } => {
            println!("{}", netmon::status(&settings.netmon)?);
            Ok(())
        }
        Command::Netmon { status: false } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(netmon::run(&settings.netmon))
        }
        Command::List { log, json } => list(&settings, log, json),
        Command::Show { log, id, last } => show(&settings, log, id, last),
        Command::Init { target } => {
            print!("{}", shell_init::render(target, &settings));
            Ok(())
        }
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tmlog=debug")
    } else {
        EnvFilter::new("tmlog=info")
    };

    // stdout carries markers and block output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn mark(trigger: &MarkTrigger) {
    let slot_dir = paths::marker_slot_dir();
    let stdout = std::io::stdout();
    match trigger {
        MarkTrigger::Exec { session, command } => {
            let command = command.join(" ");
            marker::fire(Trigger::Exec(command.as_bytes()), session, &slot_dir, stdout.lock());
        }
        MarkTrigger::Prompt { session } => {
            marker::fire(Trigger::Prompt, session, &slot_dir, stdout.lock());
        }
    }
}

fn capture(settings: &Settings, pane: Option<String>) -> Result<()> {
    let pane = match pane {
        Some(raw) => tmux::sanitize_pane_identifier(&raw),
        None => tmux::pane_id_from_env(),
    };
    let started = chrono::Utc::now().timestamp();
    let log = PaneLog::create(&settings.capture.log_dir, &pane, started)?;

    let stats = CaptureDaemon::new(
        log,
        settings.capture.max_size_bytes,
        Duration::from_secs(settings.capture.check_interval_secs),
    )
    .run(std::io::stdin())?;

    if stats.bytes_lost > 0 {
        tracing::warn!("{} bytes could not be written", stats.bytes_lost);
    }
    Ok(())
}

/// Pane logs in the configured directory, current pane first
fn candidate_logs(settings: &Settings) -> Vec<PathBuf> {
    let prefix = TmuxClient::new().current_pane_prefix();
    capture::log_candidates(&settings.capture.log_dir, prefix.as_deref())
}

/// Explicit log, or the newest log for the current pane
fn resolve_log(settings: &Settings, log: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(log) = log {
        return Ok(paths::expand_home(&log));
    }
    candidate_logs(settings)
        .into_iter()
        .next()
        .with_context(|| format!("No pane logs in {:?}", settings.capture.log_dir))
}

/// `-` reads a piped log from stdin
fn read_source(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read log from stdin")?;
        return Ok(data);
    }
    capture::read_log(path)
}

fn load_blocks(settings: &Settings, log: Option<PathBuf>) -> Result<(Vec<u8>, Vec<CommandBlock>)> {
    let path = resolve_log(settings, log)?;
    tracing::debug!("Reading {:?}", path);
    let data = read_source(&path)?;
    let blocks = marker::reconstruct(&data);
    Ok((data, blocks))
}

fn list(settings: &Settings, log: Option<PathBuf>, json: bool) -> Result<()> {
    let (_, blocks) = load_blocks(settings, log)?;
    let mut out = std::io::stdout().lock();

    for block in &blocks {
        let summary = block.summary();
        if json {
            writeln!(out, "{}", serde_json::to_string(&summary)?)?;
        } else {
            let when = chrono::DateTime::from_timestamp(summary.timestamp, 0)
                .map(|t| {
                    t.with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                })
                .unwrap_or_else(|| "-".to_string());
            let state = if summary.closed { ' ' } else { '*' };
            writeln!(out, "{}  {}{} {}", summary.id, when, state, summary.command)?;
        }
    }
    Ok(())
}

fn show(
    settings: &Settings,
    log: Option<PathBuf>,
    id: Option<String>,
    last: Option<usize>,
) -> Result<()> {
    if last == Some(0) {
        bail!("--last counts from 1");
    }

    let (data, block) = match (log, id) {
        // An id can live in any pane's log; search them newest first
        (None, Some(id)) => {
            let logs = candidate_logs(settings);
            let (path, data, block) = blocks::search_logs(&logs, &id).with_context(|| {
                format!("No command with ID {} in {:?}", id, settings.capture.log_dir)
            })?;
            tracing::debug!("Found {} in {:?}", id, path);
            (data, block)
        }
        (log, id) => {
            let (data, blocks) = load_blocks(settings, log)?;
            let block = match id {
                Some(id) => blocks::find_by_id(&blocks, &id)
                    .with_context(|| format!("No command with ID {}", id))?,
                None => blocks::nth_latest(&blocks, last.unwrap_or(1))
                    .with_context(|| format!("Only {} commands recorded", blocks.len()))?,
            }
            .clone();
            (data, block)
        }
    };

    let mut out = std::io::stdout().lock();
    out.write_all(&block.raw(&data, true))?;
    out.flush()?;
    Ok(())
}
