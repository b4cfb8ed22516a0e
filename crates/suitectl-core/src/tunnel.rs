//! Tunnel readiness checks.
//!
//! A suite that declares a tunnel must not start a remote job until the
//! tunnel is reported ready, otherwise the job burns a grid slot on a target
//! it cannot reach.

use crate::clock;
use std::sync::Arc;
use std::time::Duration;
use suitectl_proto::{Suite, TunnelRef, TunnelService};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time a tunnel has to show up before the suite is errored.
pub const DEFAULT_TUNNEL_CHECK_WINDOW: Duration = Duration::from_secs(60);

/// Default delay between readiness lookups.
pub const DEFAULT_TUNNEL_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Errors from tunnel validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunnelError {
    /// The tunnel was not found or not ready within the check window.
    #[error("tunnel '{tunnel}' is not available")]
    Unavailable { tunnel: TunnelRef },

    /// The run was cancelled while waiting for the tunnel.
    #[error("tunnel check for '{tunnel}' cancelled")]
    Cancelled { tunnel: TunnelRef },
}

/// Validates tunnel references against the grid.
#[derive(Clone)]
pub struct TunnelGate {
    service: Arc<dyn TunnelService>,
    check_window: Duration,
    check_interval: Duration,
}

impl TunnelGate {
    pub fn new(service: Arc<dyn TunnelService>) -> Self {
        Self {
            service,
            check_window: DEFAULT_TUNNEL_CHECK_WINDOW,
            check_interval: DEFAULT_TUNNEL_CHECK_INTERVAL,
        }
    }

    /// Sets how long to wait for a tunnel before giving up.
    pub fn with_check_window(mut self, window: Duration) -> Self {
        self.check_window = window;
        self
    }

    /// Sets the delay between lookups.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Validates a suite's tunnel requirement.
    ///
    /// Suites without a tunnel pass immediately. Lookup errors inside the
    /// window are logged and retried; they only surface as
    /// [`TunnelError::Unavailable`] once the window is exhausted.
    pub async fn validate(
        &self,
        tunnel: Option<&TunnelRef>,
        cancel: &CancellationToken,
    ) -> Result<(), TunnelError> {
        let Some(tunnel) = tunnel else {
            return Ok(());
        };

        let deadline = clock::deadline_after(Instant::now(), self.check_window);
        loop {
            match self.service.tunnel_ready(tunnel).await {
                Ok(true) => {
                    debug!(tunnel = %tunnel, "Tunnel is ready");
                    return Ok(());
                }
                Ok(false) => debug!(tunnel = %tunnel, "Tunnel not ready yet"),
                Err(e) => warn!(tunnel = %tunnel, error = %e, "Tunnel lookup failed"),
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return Err(TunnelError::Unavailable {
                    tunnel: tunnel.clone(),
                });
            }

            let wake = clock::wake_at(now, self.check_interval, deadline);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(TunnelError::Cancelled { tunnel: tunnel.clone() });
                }
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Validates every distinct tunnel referenced by `suites`, once each.
    ///
    /// Returns the tunnels that failed validation.
    pub async fn validate_all(
        &self,
        suites: &[Suite],
        cancel: &CancellationToken,
    ) -> Vec<TunnelError> {
        let mut seen: Vec<&TunnelRef> = Vec::new();
        let mut failures = Vec::new();

        for tunnel in suites.iter().filter_map(|s| s.tunnel.as_ref()) {
            if seen.contains(&tunnel) {
                continue;
            }
            seen.push(tunnel);

            if let Err(e) = self.validate(Some(tunnel), cancel).await {
                failures.push(e);
            }
        }

        if failures.is_empty() && !seen.is_empty() {
            info!(count = seen.len(), "All tunnels validated");
        }
        failures
    }
}
