//! Routing-table events and queries (iproute2)

use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

/// Tokens marking a default-route, catch-all, deletion or gateway change
static ROUTE_CHANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:default|Deleted|via)\b|(?:^|\s)0\.0\.0\.0(?:/\d{1,2})?(?:\s|$)")
        .expect("Invalid ROUTE_CHANGE_PATTERN regex")
});

/// Whether an `ip monitor route` line can affect the public address
pub fn is_route_change(line: &str) -> bool {
    ROUTE_CHANGE_PATTERN.is_match(line)
}

/// Drops triggers arriving within `window` of the last accepted one
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Accept the trigger at `now` if the window has passed
    pub fn should_fire(&mut self, now: Instant) -> bool {
        let due = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Routing table queries used when resolution fails
pub trait RouteTable {
    /// Whether any default route is installed
    fn has_default_route(&self) -> impl Future<Output = bool> + Send;
}

/// `ip route show default`
#[derive(Debug, Default, Clone)]
pub struct IpRouteTable;

impl RouteTable for IpRouteTable {
    async fn has_default_route(&self) -> bool {
        let output = Command::new("ip")
            .args(["route", "show", "default"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => {
                String::from_utf8_lossy(&o.stdout).lines().any(|l| !l.trim().is_empty())
            }
            Ok(o) => {
                tracing::debug!("ip route show default exited with {}", o.status);
                false
            }
            Err(e) => {
                tracing::debug!("Failed to run ip route: {}", e);
                false
            }
        }
    }
}

/// Start `ip monitor route` with its event lines on stdout
pub fn spawn_route_monitor() -> std::io::Result<Child> {
    Command::new("ip")
        .args(["monitor", "route"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}
