//! Per-suite results.

use crate::artifact::ArtifactOutcome;
use crate::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of running one suite. Produced exactly once per suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_name: String,

    /// Final status. Local failures (tunnel, start) are reported as `Errored`.
    pub status: JobStatus,

    /// Remote job, if one was ever started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,

    /// Error that ended the suite without a remote verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(with = "duration_secs")]
    pub duration: Duration,

    #[serde(default)]
    pub artifacts: ArtifactOutcome,

    /// True if the result was synthesized by a dry run.
    #[serde(default)]
    pub dry_run: bool,
}

impl SuiteResult {
    /// Creates a result finishing now, with no job, error or artifacts.
    pub fn new(
        suite_name: impl Into<String>,
        status: JobStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration = (finished_at - started_at).to_std().unwrap_or_default();
        Self {
            suite_name: suite_name.into(),
            status,
            job_id: None,
            error: None,
            started_at,
            finished_at,
            duration,
            artifacts: ArtifactOutcome::Skipped,
            dry_run: false,
        }
    }

    /// A suite that never ran because the run was cancelled first.
    pub fn not_started(suite_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(suite_name, JobStatus::Stopped, Utc::now());
        result.error = Some(reason.into());
        result
    }

    pub fn with_job(mut self, job_id: Option<JobId>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactOutcome) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Derived verdict.
    pub fn passed(&self) -> bool {
        self.status == JobStatus::Passed
    }

    /// True if a remote job was created for this suite.
    pub fn job_started(&self) -> bool {
        self.job_id.is_some()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(de)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }
}
