//! # suitectl-core
//!
//! Core orchestration for suitectl.
//!
//! This crate provides:
//! - Account-wide admission control for remote jobs
//! - Tunnel validation before any job starts
//! - The per-suite executor state machine (start, poll, stop, timeout)
//! - The run orchestrator that fans suites out and aggregates results
//! - Project configuration loading and validation
//! - In-memory service doubles for tests

mod clock;
pub mod config;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod region;
pub mod retry;
pub mod run_result;
pub mod testing;
pub mod tunnel;

pub use config::{ConfigError, DEFAULT_CONFIG_PATH, Overrides, Project, TestEnv, parse_duration};
pub use executor::{DEFAULT_POLL_INTERVAL, ExecutorSettings, ExecutorState, SuiteExecutor};
pub use gate::{ConcurrencyGate, ConcurrencyLimits, ConcurrencySlot};
pub use orchestrator::{
    ProgressCallback, ProgressEvent, RunError, RunOptions, RunOrchestrator, Services,
};
pub use region::{Region, UnknownRegion};
pub use retry::{DEFAULT_POLL_RETRY_BUDGET, RetryPolicy};
pub use run_result::{EXIT_FAILURE, EXIT_SETUP_FAILURE, EXIT_SUCCESS, LocalOutcome, RunResult};
pub use tunnel::{TunnelError, TunnelGate};
