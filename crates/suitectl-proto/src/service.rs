//! Capability traits consumed by the orchestrator.
//!
//! The orchestrator never talks to a grid or a container engine directly.
//! It is handed implementations of these traits: the REST client for the
//! remote grid, the container runner for local suites, or in-memory doubles
//! in tests.

use crate::artifact::{ArtifactDownload, ArtifactPolicy};
use crate::error::ServiceResult;
use crate::job::{JobId, JobStatus};
use crate::suite::{Suite, TunnelRef};
use async_trait::async_trait;

/// Control over remote jobs.
#[async_trait]
pub trait JobLifecycle: Send + Sync {
    /// Submits a suite as a new remote job.
    async fn start_job(&self, suite: &Suite) -> ServiceResult<JobId>;

    /// Reads the current status of a job.
    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatus>;

    /// Asks the grid to stop a job. Callers treat this as best-effort.
    async fn stop_job(&self, job_id: &JobId) -> ServiceResult<()>;

    /// Fetches the artifacts of a finished job into `policy.directory`.
    ///
    /// `suite_name` scopes the target directory so suites never overwrite
    /// each other's files.
    async fn download_artifacts(
        &self,
        job_id: &JobId,
        suite_name: &str,
        policy: &ArtifactPolicy,
    ) -> ServiceResult<ArtifactDownload>;
}

/// Reads how many jobs the account may run at once.
#[async_trait]
pub trait ConcurrencyReader: Send + Sync {
    async fn allowed_concurrency(&self) -> ServiceResult<usize>;
}

/// Looks up whether a tunnel is up and usable.
#[async_trait]
pub trait TunnelService: Send + Sync {
    async fn tunnel_ready(&self, tunnel: &TunnelRef) -> ServiceResult<bool>;
}

/// Runs suites in the local container sandbox.
#[async_trait]
pub trait LocalRunner: Send + Sync {
    /// Runs every suite and returns the aggregate process exit code.
    async fn run_locally(&self, suites: &[Suite]) -> ServiceResult<i32>;
}
