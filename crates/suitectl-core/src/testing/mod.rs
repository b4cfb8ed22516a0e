//! In-memory service doubles for deterministic orchestration tests.

pub mod mock_jobs;
pub mod mock_services;

pub use mock_jobs::{MockJobs, ScriptedPoll};
pub use mock_services::{MockConcurrency, MockLocalRunner, MockTunnels};
