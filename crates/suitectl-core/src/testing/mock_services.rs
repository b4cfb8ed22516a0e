//! Concurrency, tunnel, and local runner doubles.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use suitectl_proto::{
    ConcurrencyReader, LocalRunner, ServiceError, ServiceResult, Suite, TunnelRef, TunnelService,
};

/// Reports a fixed allowed concurrency, or fails.
#[derive(Debug)]
pub struct MockConcurrency {
    allowed: Option<usize>,
    reads: AtomicUsize,
}

impl MockConcurrency {
    pub fn new(allowed: usize) -> Self {
        Self {
            allowed: Some(allowed),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            allowed: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConcurrencyReader for MockConcurrency {
    async fn allowed_concurrency(&self) -> ServiceResult<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.allowed
            .ok_or_else(|| ServiceError::Transient("concurrency endpoint unavailable".into()))
    }
}

/// Tunnels that become ready after a given number of lookups.
///
/// Unknown tunnels are never ready.
#[derive(Debug, Default)]
pub struct MockTunnels {
    ready_after: HashMap<String, usize>,
    seen: Mutex<HashMap<String, usize>>,
    lookups: AtomicUsize,
}

impl MockTunnels {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tunnel that is ready on the first lookup.
    pub fn with_ready(self, name: &str) -> Self {
        self.with_ready_after(name, 1)
    }

    /// A tunnel that reports ready on lookup number `lookups`.
    pub fn with_ready_after(mut self, name: &str, lookups: usize) -> Self {
        self.ready_after.insert(name.to_string(), lookups.max(1));
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelService for MockTunnels {
    async fn tunnel_ready(&self, tunnel: &TunnelRef) -> ServiceResult<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut seen = self.seen.lock().unwrap();
        let count = seen.entry(tunnel.name.clone()).or_default();
        *count += 1;

        Ok(self
            .ready_after
            .get(&tunnel.name)
            .is_some_and(|needed| *count >= *needed))
    }
}

/// Local runner returning a fixed exit code and recording what it ran.
#[derive(Debug, Default)]
pub struct MockLocalRunner {
    exit_code: i32,
    runs: Mutex<Vec<Vec<String>>>,
}

impl MockLocalRunner {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Suite names of every invocation.
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalRunner for MockLocalRunner {
    async fn run_locally(&self, suites: &[Suite]) -> ServiceResult<i32> {
        self.runs
            .lock()
            .unwrap()
            .push(suites.iter().map(|s| s.name.clone()).collect());
        Ok(self.exit_code)
    }
}
