//! Aggregate outcome of a run.
//!
//! The verdict and exit code are pure functions of the set of suite
//! verdicts: the order in which suites finished never changes them.

use serde::Serialize;
use std::time::Duration;
use suitectl_proto::{JobStatus, SuiteResult};

/// Exit code for a fully passing run.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for a run where at least one suite did not pass.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for a run that failed before any suite could execute
/// (configuration, region, tunnel or credential problems).
pub const EXIT_SETUP_FAILURE: i32 = 2;

/// Outcome of the local (container) partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalOutcome {
    pub suites: Vec<String>,
    pub exit_code: i32,
}

impl LocalOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Aggregate result of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Remote suite results in completion order.
    pub results: Vec<SuiteResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalOutcome>,

    pub dry_run: bool,

    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl RunResult {
    pub fn new(results: Vec<SuiteResult>, local: Option<LocalOutcome>, dry_run: bool) -> Self {
        Self {
            results,
            local,
            dry_run,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Number of suites covered, local partition included.
    pub fn suite_count(&self) -> usize {
        self.results.len() + self.local.as_ref().map_or(0, |l| l.suites.len())
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.count_status(JobStatus::Failed)
    }

    pub fn errored_count(&self) -> usize {
        self.count_status(JobStatus::Errored)
    }

    pub fn timed_out_count(&self) -> usize {
        self.count_status(JobStatus::TimedOut)
    }

    pub fn stopped_count(&self) -> usize {
        self.count_status(JobStatus::Stopped)
    }

    fn count_status(&self, status: JobStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True iff every suite passed.
    pub fn success(&self) -> bool {
        self.results.iter().all(SuiteResult::passed)
            && self.local.as_ref().is_none_or(LocalOutcome::passed)
    }

    /// Results that did not pass.
    pub fn failures(&self) -> Vec<&SuiteResult> {
        self.results.iter().filter(|r| !r.passed()).collect()
    }

    /// True if any suite actually executed: a remote job was created, or the
    /// local partition ran.
    pub fn anything_executed(&self) -> bool {
        self.results.iter().any(SuiteResult::job_started) || self.local.is_some()
    }

    /// Process exit code derived from the verdicts.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            EXIT_SUCCESS
        } else if self.anything_executed() {
            EXIT_FAILURE
        } else {
            EXIT_SETUP_FAILURE
        }
    }
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_f64(value.as_secs_f64())
}
