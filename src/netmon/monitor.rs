//! Event loop: route changes -> debounced public address refresh

use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::resolver::AddressResolver;
use super::routes::{is_route_change, Debouncer, RouteTable};
use super::state_file::{NetState, NetStateFile};

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Shutdown,
    /// The route event stream ended
    EventsClosed,
}

/// Single-consumer monitor; debounce state needs no locking
pub struct NetworkMonitor<R, T> {
    resolver: R,
    routes: T,
    state: NetStateFile,
    debouncer: Debouncer,
    settle: Duration,
}

impl<R: AddressResolver, T: RouteTable> NetworkMonitor<R, T> {
    pub fn new(resolver: R, routes: T, state: NetStateFile) -> Self {
        Self {
            resolver,
            routes,
            state,
            debouncer: Debouncer::new(Duration::from_secs(2)),
            settle: Duration::from_secs(1),
        }
    }

    /// Minimum spacing between event-triggered resolutions
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    /// Delay between an accepted event and resolution
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Resolve once and record the outcome
    pub async fn refresh(&self) -> NetState {
        let state = match self.resolver.resolve().await {
            Ok(addr) => NetState::Address(addr),
            Err(e) => {
                tracing::debug!("Public address lookup failed: {}", e);
                if self.routes.has_default_route().await {
                    NetState::Retrying
                } else {
                    NetState::Offline
                }
            }
        };

        match self.state.write(state) {
            Ok(()) => tracing::info!("Network state: {}", state),
            Err(e) => tracing::warn!("Failed to write network state: {:#}", e),
        }
        state
    }

    /// Handle one route event observed at `now`
    ///
    /// Returns the new state when the event led to a resolution.
    pub async fn handle_event(&mut self, line: &str, now: Instant) -> Option<NetState> {
        if !is_route_change(line) {
            return None;
        }
        if !self.debouncer.should_fire(now) {
            tracing::debug!("Debounced route event: {}", line);
            return None;
        }

        tracing::debug!("Route change: {}", line);
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        Some(self.refresh().await)
    }

    /// Resolve immediately, then follow `events` until EOF or `shutdown`
    pub async fn run<E, S>(&mut self, events: E, shutdown: S) -> Result<StopReason>
    where
        E: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        self.refresh().await;

        let mut lines = events.lines();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(StopReason::Shutdown),
                line = lines.next_line() => match line? {
                    Some(line) => {
                        self.handle_event(&line, Instant::now()).await;
                    }
                    None => return Ok(StopReason::EventsClosed),
                },
            }
        }
    }
}
