//! Account-wide admission control for remote jobs.
//!
//! The gate holds a fixed number of slots, read once per run from the grid.
//! A suite must hold a [`ConcurrencySlot`] from before its job starts until
//! the job reaches a terminal state. Slots are released on drop, so every
//! exit path (errors, cancellation, panics) gives the slot back exactly once.
//!
//! # Example
//!
//! ```no_run
//! use suitectl_core::gate::ConcurrencyGate;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let gate = ConcurrencyGate::with_capacity(2);
//! let cancel = CancellationToken::new();
//!
//! if let Some(slot) = gate.acquire(&cancel).await {
//!     // ... start and poll a job ...
//!     drop(slot);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use suitectl_proto::ConcurrencyReader;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Limits applied on top of the upstream concurrency value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    /// User-requested cap. Lowers the upstream value, never raises it.
    pub requested: Option<usize>,

    /// Hard clamp regardless of what the account allows.
    pub ceiling: Option<usize>,
}

#[derive(Debug, Default)]
struct GateCounters {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Bounded admission for suite executions.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<GateCounters>,
}

impl ConcurrencyGate {
    /// Creates a gate with a fixed capacity. Zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Creates a gate sized from a single upstream read.
    ///
    /// A failed read, or a value below one, degrades to serial execution
    /// instead of failing the run.
    pub async fn from_upstream(reader: &dyn ConcurrencyReader, limits: ConcurrencyLimits) -> Self {
        let upstream = match reader.allowed_concurrency().await {
            Ok(n) if n >= 1 => n,
            Ok(n) => {
                warn!(
                    allowed = n,
                    "Grid reported no allowed concurrency, running suites serially"
                );
                1
            }
            Err(e) => {
                warn!(error = %e, "Failed to read allowed concurrency, running suites serially");
                1
            }
        };

        let capacity = resolve_capacity(upstream, limits);
        info!(upstream, capacity, "Concurrency gate initialized");
        Self::with_capacity(capacity)
    }

    /// Waits for a free slot.
    ///
    /// Returns `None` if `cancel` fires before a slot becomes available.
    /// Cancellation wins when both are ready at the same time.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<ConcurrencySlot> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok()?,
        };

        let in_use = self.counters.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(in_use, Ordering::SeqCst);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(in_use, capacity = self.capacity, "Concurrency slot acquired");

        Some(ConcurrencySlot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.counters.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak_in_use(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn acquired_total(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released_total(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

/// Applies the requested cap and the ceiling to an upstream value.
pub fn resolve_capacity(upstream: usize, limits: ConcurrencyLimits) -> usize {
    let mut capacity = upstream.max(1);
    if let Some(requested) = limits.requested.filter(|n| *n >= 1) {
        capacity = capacity.min(requested);
    }
    if let Some(ceiling) = limits.ceiling.filter(|n| *n >= 1)
        && capacity > ceiling
    {
        warn!(capacity, ceiling, "Concurrency clamped to configured ceiling");
        capacity = ceiling;
    }
    capacity
}

/// A held admission slot. Released when dropped.
#[derive(Debug)]
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.counters.in_use.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        debug!("Concurrency slot released");
    }
}
