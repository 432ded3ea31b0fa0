//! Network state monitor
//!
//! A per-user singleton that keeps a one-line public address record fresh.
//! It resolves once at startup, then again on qualifying routing-table
//! changes reported by `ip monitor route`.

pub mod lock;
pub mod monitor;
pub mod resolver;
pub mod routes;
pub mod state_file;

pub use lock::{LockError, MonitorLock};
pub use monitor::{NetworkMonitor, StopReason};
pub use resolver::{AddressResolver, PublicAddressResolver, ResolveError};
pub use routes::{is_route_change, Debouncer, IpRouteTable, RouteTable};
pub use state_file::{NetState, NetStateFile};

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal::unix::{signal, SignalKind};

use crate::config::NetmonSettings;

/// Run the monitor until SIGTERM/SIGINT or the event stream ends
pub async fn run(settings: &NetmonSettings) -> Result<()> {
    let lock_path = settings.lock_path();
    // Superseding waits for the old instance to exit
    let acquire_path = lock_path.clone();
    let lock = tokio::task::spawn_blocking(move || MonitorLock::acquire(&acquire_path))
        .await
        .context("Lock acquisition task failed")?
        .with_context(|| format!("Failed to acquire monitor lock: {:?}", lock_path))?;
    if !lock.is_held() {
        bail!("Superseded by a newer monitor during startup");
    }
    tracing::info!("Network monitor started (pid {})", lock.pid());

    let mut events_proc =
        routes::spawn_route_monitor().context("Failed to start `ip monitor route`")?;
    let stdout = events_proc
        .stdout
        .take()
        .context("`ip monitor route` has no stdout")?;

    let mut monitor = NetworkMonitor::new(
        PublicAddressResolver::from_settings(settings),
        IpRouteTable,
        NetStateFile::new(settings.state_path()),
    )
    .with_debounce(Duration::from_secs(settings.debounce_secs))
    .with_settle(Duration::from_millis(settings.settle_ms));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    };

    let reason = monitor.run(BufReader::new(stdout), shutdown).await?;
    match reason {
        StopReason::Shutdown => tracing::info!("Network monitor stopping"),
        StopReason::EventsClosed => tracing::warn!("Route event stream closed; exiting"),
    }

    let _ = events_proc.kill().await;
    drop(lock);
    Ok(())
}

/// Current network state line, for status bars
pub fn status(settings: &NetmonSettings) -> Result<NetState> {
    NetStateFile::new(settings.state_path()).read()
}
