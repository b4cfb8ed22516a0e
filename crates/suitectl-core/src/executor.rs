//! Runs a single suite against the remote grid.
//!
//! Each [`SuiteExecutor`] walks one suite through a fixed sequence of states:
//!
//! ```text
//! Pending → SlotAcquired → TunnelChecked → JobStarted → Polling → Terminal
//! ```
//!
//! Any state may jump straight to `Terminal` on failure or cancellation.
//! Whatever the path, the executor acquires at most one concurrency slot,
//! releases it exactly once, and produces exactly one [`SuiteResult`].

use crate::clock;
use crate::gate::{ConcurrencyGate, ConcurrencySlot};
use crate::retry::RetryPolicy;
use crate::tunnel::{TunnelError, TunnelGate};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use suitectl_proto::{
    ArtifactOutcome, ArtifactPolicy, JobId, JobLifecycle, JobStatus, Suite, SuiteResult,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay between job status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle state of a suite execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Pending,
    SlotAcquired,
    TunnelChecked,
    JobStarted,
    Polling,
    Terminal(JobStatus),
}

/// Settings shared by every executor of a run.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub abort_on_failure: bool,
    pub dry_run: bool,
    pub artifacts: ArtifactPolicy,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            abort_on_failure: false,
            dry_run: false,
            artifacts: ArtifactPolicy::default(),
        }
    }
}

/// Drives one suite from admission to a result.
pub struct SuiteExecutor {
    suite: Suite,
    jobs: Arc<dyn JobLifecycle>,
    gate: ConcurrencyGate,
    tunnels: TunnelGate,
    settings: Arc<ExecutorSettings>,
    cancel: CancellationToken,
    state: ExecutorState,
    transitions: Vec<ExecutorState>,
}

impl SuiteExecutor {
    pub fn new(
        suite: Suite,
        jobs: Arc<dyn JobLifecycle>,
        gate: ConcurrencyGate,
        tunnels: TunnelGate,
        settings: Arc<ExecutorSettings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            suite,
            jobs,
            gate,
            tunnels,
            settings,
            cancel,
            state: ExecutorState::Pending,
            transitions: vec![ExecutorState::Pending],
        }
    }

    pub fn suite(&self) -> &Suite {
        &self.suite
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[ExecutorState] {
        &self.transitions
    }

    /// Runs the suite to completion.
    pub async fn run(&mut self) -> SuiteResult {
        let Some(slot) = self.gate.acquire(&self.cancel).await else {
            self.transition(ExecutorState::Terminal(JobStatus::Stopped));
            info!(suite = %self.suite.name, "Run cancelled before suite was admitted");
            return SuiteResult::not_started(
                &self.suite.name,
                "run cancelled before the suite was started",
            );
        };
        let started_at = Utc::now();
        self.transition(ExecutorState::SlotAcquired);

        if let Err(e) = self
            .tunnels
            .validate(self.suite.tunnel.as_ref(), &self.cancel)
            .await
        {
            let status = match e {
                TunnelError::Unavailable { .. } => JobStatus::Errored,
                TunnelError::Cancelled { .. } => JobStatus::Stopped,
            };
            warn!(suite = %self.suite.name, error = %e, "Tunnel validation failed");
            return self
                .finish(slot, status, None, Some(e.to_string()), started_at)
                .await;
        }
        self.transition(ExecutorState::TunnelChecked);

        if self.cancel.is_cancelled() {
            return self
                .finish(
                    slot,
                    JobStatus::Stopped,
                    None,
                    Some("run cancelled before the job was started".to_string()),
                    started_at,
                )
                .await;
        }

        if self.settings.dry_run {
            info!(suite = %self.suite.name, "Dry run: suite validated, job not started");
            let result = self
                .finish(slot, JobStatus::Passed, None, None, started_at)
                .await;
            return result.dry_run();
        }

        let job_id = match self.jobs.start_job(&self.suite).await {
            Ok(id) => id,
            Err(e) => {
                warn!(suite = %self.suite.name, error = %e, "Failed to start job");
                return self
                    .finish(
                        slot,
                        JobStatus::Errored,
                        None,
                        Some(format!("failed to start job: {e}")),
                        started_at,
                    )
                    .await;
            }
        };
        info!(suite = %self.suite.name, job_id = %job_id, "Job started");
        self.transition(ExecutorState::JobStarted);

        let (status, error) = self.poll(&job_id).await;
        self.finish(slot, status, Some(job_id), error, started_at)
            .await
    }

    /// Polls a started job until it reaches a terminal status, times out, or
    /// the run is cancelled.
    async fn poll(&mut self, job_id: &JobId) -> (JobStatus, Option<String>) {
        self.transition(ExecutorState::Polling);

        let deadline = self
            .suite
            .timeout
            .and_then(|t| clock::deadline_after(Instant::now(), t));
        let retry = self.settings.retry;
        let mut failures: u32 = 0;

        loop {
            let wait = match self.jobs.job_status(job_id).await {
                Ok(status) if status.is_terminal() => {
                    info!(
                        suite = %self.suite.name,
                        job_id = %job_id,
                        status = %status,
                        "Job finished"
                    );
                    return (status, None);
                }
                Ok(status) => {
                    failures = 0;
                    debug!(
                        suite = %self.suite.name,
                        job_id = %job_id,
                        status = %status,
                        "Job in progress"
                    );
                    self.settings.poll_interval
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if !retry.allows(failures) {
                        warn!(
                            suite = %self.suite.name,
                            job_id = %job_id,
                            error = %e,
                            failures,
                            "Giving up on job status"
                        );
                        return (
                            JobStatus::Errored,
                            Some(format!(
                                "job status unavailable after {failures} consecutive failures: {e}"
                            )),
                        );
                    }
                    let backoff = retry.backoff_for(failures);
                    warn!(
                        suite = %self.suite.name,
                        job_id = %job_id,
                        error = %e,
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "Job status read failed, retrying"
                    );
                    backoff
                }
                Err(e) => {
                    warn!(
                        suite = %self.suite.name,
                        job_id = %job_id,
                        error = %e,
                        "Job status read failed"
                    );
                    return (JobStatus::Errored, Some(format!("job status unavailable: {e}")));
                }
            };

            let now = Instant::now();
            if let Some(deadline) = deadline
                && now >= deadline
            {
                warn!(suite = %self.suite.name, job_id = %job_id, "Suite timed out, stopping job");
                self.stop_job(job_id).await;
                let limit = self.suite.timeout.unwrap_or_default();
                return (
                    JobStatus::TimedOut,
                    Some(format!("suite exceeded its timeout of {}s", limit.as_secs())),
                );
            }

            let wake = clock::wake_at(now, wait, deadline);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!(
                        suite = %self.suite.name,
                        job_id = %job_id,
                        "Run cancelled, stopping job"
                    );
                    self.stop_job(job_id).await;
                    return (JobStatus::Stopped, Some("run cancelled".to_string()));
                }
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Best-effort stop. Failures are logged, never escalated.
    async fn stop_job(&self, job_id: &JobId) {
        if let Err(e) = self.jobs.stop_job(job_id).await {
            warn!(suite = %self.suite.name, job_id = %job_id, error = %e, "Failed to stop job");
        }
    }

    /// Enters the terminal state: triggers the abort policy, releases the
    /// slot, fetches artifacts, and builds the result.
    async fn finish(
        &mut self,
        slot: ConcurrencySlot,
        status: JobStatus,
        job_id: Option<JobId>,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> SuiteResult {
        self.transition(ExecutorState::Terminal(status));

        // Cancel before releasing the slot so no waiting sibling gets admitted.
        if self.settings.abort_on_failure
            && !matches!(status, JobStatus::Passed | JobStatus::Stopped)
            && !self.cancel.is_cancelled()
        {
            info!(suite = %self.suite.name, status = %status, "Aborting run after first failure");
            self.cancel.cancel();
        }
        drop(slot);

        let artifacts = match &job_id {
            Some(id) if self.settings.artifacts.when.applies_to(status) => {
                self.fetch_artifacts(id).await
            }
            _ => ArtifactOutcome::Skipped,
        };

        let mut result = SuiteResult::new(&self.suite.name, status, started_at)
            .with_job(job_id)
            .with_artifacts(artifacts);
        result.error = error;
        result
    }

    async fn fetch_artifacts(&self, job_id: &JobId) -> ArtifactOutcome {
        match self
            .jobs
            .download_artifacts(job_id, &self.suite.name, &self.settings.artifacts)
            .await
        {
            Ok(download) => {
                if !download.failed.is_empty() {
                    warn!(
                        suite = %self.suite.name,
                        failed = download.failed.len(),
                        "Some artifacts could not be downloaded"
                    );
                }
                download.into()
            }
            Err(e) => {
                warn!(
                    suite = %self.suite.name,
                    job_id = %job_id,
                    error = %e,
                    "Artifact download failed"
                );
                ArtifactOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn transition(&mut self, next: ExecutorState) {
        debug!(suite = %self.suite.name, from = ?self.state, to = ?next, "Suite state transition");
        self.state = next;
        self.transitions.push(next);
    }
}
