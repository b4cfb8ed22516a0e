//! Run orchestration.
//!
//! The [`RunOrchestrator`] owns one invocation: it splits suites into the
//! local and remote partitions, fans the remote suites out to
//! [`SuiteExecutor`]s behind a shared [`ConcurrencyGate`], and folds every
//! result into a [`RunResult`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use suitectl_core::orchestrator::{RunOptions, RunOrchestrator, Services};
//! use suitectl_core::testing::{MockConcurrency, MockJobs, MockTunnels};
//! use suitectl_proto::Suite;
//!
//! #[tokio::main]
//! async fn main() {
//!     let services = Services::remote(
//!         Arc::new(MockJobs::new()),
//!         Arc::new(MockConcurrency::new(2)),
//!         Arc::new(MockTunnels::new()),
//!     );
//!     let orchestrator = RunOrchestrator::new(services, RunOptions::default().dry_run(true));
//!
//!     let run = orchestrator
//!         .run(vec![Suite::new("chrome", "cypress")])
//!         .await
//!         .unwrap();
//!     println!("exit code: {}", run.exit_code());
//! }
//! ```

use crate::executor::{DEFAULT_POLL_INTERVAL, ExecutorSettings, SuiteExecutor};
use crate::gate::{ConcurrencyGate, ConcurrencyLimits};
use crate::retry::RetryPolicy;
use crate::run_result::{EXIT_SETUP_FAILURE, LocalOutcome, RunResult};
use crate::tunnel::{DEFAULT_TUNNEL_CHECK_INTERVAL, DEFAULT_TUNNEL_CHECK_WINDOW, TunnelGate};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use suitectl_proto::{
    ArtifactPolicy, ConcurrencyReader, JobLifecycle, JobStatus, LocalRunner, Suite, SuiteResult,
    TunnelService,
};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Errors that stop a run before any suite executes.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no suites to run")]
    NoSuites,

    #[error("duplicate suite name: {0}")]
    DuplicateSuite(String),

    #[error("suite name must not be empty")]
    UnnamedSuite,

    #[error("suite '{0}' runs locally but no local runner is configured")]
    NoLocalRunner(String),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        EXIT_SETUP_FAILURE
    }
}

/// The capability set a run executes against.
#[derive(Clone)]
pub struct Services {
    pub jobs: Arc<dyn JobLifecycle>,
    pub concurrency: Arc<dyn ConcurrencyReader>,
    pub tunnels: Arc<dyn TunnelService>,
    pub local: Option<Arc<dyn LocalRunner>>,
}

impl Services {
    /// Services for a run without a local partition.
    pub fn remote(
        jobs: Arc<dyn JobLifecycle>,
        concurrency: Arc<dyn ConcurrencyReader>,
        tunnels: Arc<dyn TunnelService>,
    ) -> Self {
        Self {
            jobs,
            concurrency,
            tunnels,
            local: None,
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalRunner>) -> Self {
        self.local = Some(local);
        self
    }
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Validate suites without starting jobs.
    pub dry_run: bool,

    /// Cancel everything still running after the first failing suite.
    pub abort_on_failure: bool,

    pub concurrency: ConcurrencyLimits,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub tunnel_check_window: Duration,
    pub tunnel_check_interval: Duration,
    pub artifacts: ArtifactPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            abort_on_failure: false,
            concurrency: ConcurrencyLimits::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            tunnel_check_window: DEFAULT_TUNNEL_CHECK_WINDOW,
            tunnel_check_interval: DEFAULT_TUNNEL_CHECK_INTERVAL,
            artifacts: ArtifactPolicy::default(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }

    /// Caps the upstream concurrency. Never raises it.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency.requested = Some(concurrency);
        self
    }

    pub fn with_concurrency_ceiling(mut self, ceiling: usize) -> Self {
        self.concurrency.ceiling = Some(ceiling);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tunnel_check(mut self, window: Duration, interval: Duration) -> Self {
        self.tunnel_check_window = window;
        self.tunnel_check_interval = interval;
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactPolicy) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Progress callback for run updates.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The run has been validated and partitioned.
    RunStarted {
        remote_suites: usize,
        local_suites: usize,
        dry_run: bool,
    },

    /// The remote concurrency gate is sized.
    ConcurrencyResolved { capacity: usize },

    /// The local partition finished.
    LocalCompleted { outcome: LocalOutcome },

    /// A remote suite reached its terminal state.
    SuiteCompleted { result: SuiteResult },

    /// Every suite has a result.
    RunCompleted { success: bool, exit_code: i32 },
}

/// Splits suites into the local and remote partitions, preserving order.
pub fn partition(suites: Vec<Suite>) -> (Vec<Suite>, Vec<Suite>) {
    suites.into_iter().partition(Suite::is_local)
}

/// Drives a whole run.
pub struct RunOrchestrator {
    services: Services,
    options: RunOptions,
    cancel: CancellationToken,
    on_progress: Option<ProgressCallback>,
}

impl RunOrchestrator {
    pub fn new(services: Services, options: RunOptions) -> Self {
        Self {
            services,
            options,
            cancel: CancellationToken::new(),
            on_progress: None,
        }
    }

    /// Sets a callback for progress updates.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Run-scoped cancellation signal. Cancelling it stops every in-flight
    /// suite and skips every suite not yet admitted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs every suite and returns the aggregate result.
    ///
    /// Only configuration problems are returned as errors; everything that
    /// goes wrong while suites execute is recorded in the result instead.
    pub async fn run(&self, suites: Vec<Suite>) -> Result<RunResult, RunError> {
        let start = Instant::now();
        validate_suites(&suites)?;

        let (local, remote) = partition(suites);
        if let Some(first) = local.first()
            && self.services.local.is_none()
        {
            return Err(RunError::NoLocalRunner(first.name.clone()));
        }

        info!(
            remote = remote.len(),
            local = local.len(),
            dry_run = self.options.dry_run,
            "Starting run"
        );
        self.emit_progress(ProgressEvent::RunStarted {
            remote_suites: remote.len(),
            local_suites: local.len(),
            dry_run: self.options.dry_run,
        });

        let local_outcome = if local.is_empty() {
            None
        } else {
            let outcome = self.run_local(&local).await;
            if !outcome.passed() && self.options.abort_on_failure {
                info!("Local suites failed, skipping remote suites");
                self.cancel.cancel();
            }
            self.emit_progress(ProgressEvent::LocalCompleted {
                outcome: outcome.clone(),
            });
            Some(outcome)
        };

        let results = self.run_remote(remote).await;

        let run = RunResult::new(results, local_outcome, self.options.dry_run)
            .with_duration(start.elapsed());
        info!(
            suites = run.suite_count(),
            passed = run.passed_count(),
            failed = run.failed_count(),
            errored = run.errored_count(),
            timed_out = run.timed_out_count(),
            stopped = run.stopped_count(),
            "Run finished"
        );
        self.emit_progress(ProgressEvent::RunCompleted {
            success: run.success(),
            exit_code: run.exit_code(),
        });
        Ok(run)
    }

    async fn run_local(&self, suites: &[Suite]) -> LocalOutcome {
        let names: Vec<String> = suites.iter().map(|s| s.name.clone()).collect();

        if self.options.dry_run {
            info!(count = suites.len(), "Dry run: skipping local execution");
            return LocalOutcome {
                suites: names,
                exit_code: 0,
            };
        }

        let Some(runner) = &self.services.local else {
            return LocalOutcome {
                suites: names,
                exit_code: 1,
            };
        };

        info!(count = suites.len(), "Running suites locally");
        let exit_code = match runner.run_locally(suites).await {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "Local execution failed");
                1
            }
        };
        LocalOutcome {
            suites: names,
            exit_code,
        }
    }

    async fn run_remote(&self, suites: Vec<Suite>) -> Vec<SuiteResult> {
        if suites.is_empty() {
            return Vec::new();
        }

        // A dry run never starts jobs, so it does not spend a concurrency lookup.
        let gate = if self.options.dry_run {
            ConcurrencyGate::with_capacity(self.options.concurrency.requested.unwrap_or(1))
        } else {
            ConcurrencyGate::from_upstream(
                self.services.concurrency.as_ref(),
                self.options.concurrency,
            )
            .await
        };
        self.emit_progress(ProgressEvent::ConcurrencyResolved {
            capacity: gate.capacity(),
        });

        let tunnels = TunnelGate::new(Arc::clone(&self.services.tunnels))
            .with_check_window(self.options.tunnel_check_window)
            .with_check_interval(self.options.tunnel_check_interval);
        let settings = Arc::new(ExecutorSettings {
            poll_interval: self.options.poll_interval,
            retry: self.options.retry,
            abort_on_failure: self.options.abort_on_failure,
            dry_run: self.options.dry_run,
            artifacts: self.options.artifacts.clone(),
        });

        let total = suites.len();
        let mut join_set = JoinSet::new();
        for suite in suites {
            let name = suite.name.clone();
            let mut executor = SuiteExecutor::new(
                suite,
                Arc::clone(&self.services.jobs),
                gate.clone(),
                tunnels.clone(),
                Arc::clone(&settings),
                self.cancel.clone(),
            );
            // The inner task isolates a panicking executor so its suite still gets a result.
            join_set.spawn(async move {
                let outcome = tokio::spawn(async move { executor.run().await }).await;
                (name, outcome)
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            let result = match joined {
                Ok((_, Ok(result))) => result,
                Ok((name, Err(e))) => {
                    error!(suite = %name, error = %e, "Suite execution aborted unexpectedly");
                    SuiteResult::new(name, JobStatus::Errored, Utc::now())
                        .with_error(format!("suite execution aborted: {e}"))
                }
                Err(e) => {
                    // Only reachable if the collector task itself is cancelled.
                    error!(error = %e, "Suite task failed to join");
                    continue;
                }
            };

            if self.options.abort_on_failure
                && !result.passed()
                && result.status != JobStatus::Stopped
                && !self.cancel.is_cancelled()
            {
                warn!(suite = %result.suite_name, "Aborting run after first failure");
                self.cancel.cancel();
            }

            self.emit_progress(ProgressEvent::SuiteCompleted {
                result: result.clone(),
            });
            results.push(result);
        }

        results
    }

    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

fn validate_suites(suites: &[Suite]) -> Result<(), RunError> {
    if suites.is_empty() {
        return Err(RunError::NoSuites);
    }

    let mut names = HashSet::new();
    for suite in suites {
        if suite.name.trim().is_empty() {
            return Err(RunError::UnnamedSuite);
        }
        if !names.insert(suite.name.as_str()) {
            return Err(RunError::DuplicateSuite(suite.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConcurrency, MockJobs, MockLocalRunner, MockTunnels, ScriptedPoll};
    use suitectl_proto::ExecutionMode;

    fn services(jobs: &Arc<MockJobs>, allowed: usize) -> Services {
        Services::remote(
            jobs.clone(),
            Arc::new(MockConcurrency::new(allowed)),
            Arc::new(MockTunnels::new()),
        )
    }

    #[test]
    fn test_partition_preserves_order() {
        let suites = vec![
            Suite::new("a", "cypress"),
            Suite::new("b", "cypress").with_mode(ExecutionMode::Local),
            Suite::new("c", "cypress"),
        ];
        let (local, remote) = partition(suites);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name, "b");
        let names: Vec<_> = remote.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_empty_suite_list_is_config_error() {
        let jobs = Arc::new(MockJobs::new());
        let orchestrator = RunOrchestrator::new(services(&jobs, 1), RunOptions::default());
        let err = orchestrator.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, RunError::NoSuites));
        assert_eq!(err.exit_code(), EXIT_SETUP_FAILURE);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let jobs = Arc::new(MockJobs::new());
        let orchestrator = RunOrchestrator::new(services(&jobs, 1), RunOptions::default());
        let err = orchestrator
            .run(vec![Suite::new("a", "cypress"), Suite::new("a", "cypress")])
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::DuplicateSuite(name) if name == "a"));
        assert_eq!(jobs.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_local_suites_need_runner() {
        let jobs = Arc::new(MockJobs::new());
        let orchestrator = RunOrchestrator::new(services(&jobs, 1), RunOptions::default());
        let err = orchestrator
            .run(vec![
                Suite::new("docker", "cypress").with_mode(ExecutionMode::Local),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoLocalRunner(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_and_remote_partitions_both_run() {
        let jobs = Arc::new(
            MockJobs::new().with_script("remote", ScriptedPoll::statuses(&[JobStatus::Passed])),
        );
        let local = Arc::new(MockLocalRunner::new(0));
        let orchestrator = RunOrchestrator::new(
            services(&jobs, 2).with_local(local.clone()),
            RunOptions::default(),
        );

        let run = orchestrator
            .run(vec![
                Suite::new("docker", "cypress").with_mode(ExecutionMode::Local),
                Suite::new("remote", "cypress"),
            ])
            .await
            .unwrap();

        assert!(run.success());
        assert_eq!(local.runs(), vec![vec!["docker".to_string()]]);
        assert_eq!(jobs.started_suites(), vec!["remote".to_string()]);
        assert_eq!(run.suite_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_failure_with_abort_skips_remote() {
        let jobs = Arc::new(MockJobs::new());
        let local = Arc::new(MockLocalRunner::new(1));
        let orchestrator = RunOrchestrator::new(
            services(&jobs, 2).with_local(local),
            RunOptions::default().abort_on_failure(true),
        );

        let run = orchestrator
            .run(vec![
                Suite::new("docker", "cypress").with_mode(ExecutionMode::Local),
                Suite::new("remote", "cypress"),
            ])
            .await
            .unwrap();

        assert_eq!(jobs.start_calls(), 0);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].status, JobStatus::Stopped);
        assert_eq!(run.exit_code(), crate::run_result::EXIT_FAILURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_cover_every_suite() {
        let jobs = Arc::new(
            MockJobs::new()
                .with_script("a", ScriptedPoll::statuses(&[JobStatus::Passed]))
                .with_script("b", ScriptedPoll::statuses(&[JobStatus::Failed])),
        );
        let completed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = completed.clone();
        let orchestrator = RunOrchestrator::new(services(&jobs, 2), RunOptions::default())
            .on_progress(Box::new(move |event| {
                if let ProgressEvent::SuiteCompleted { result } = event {
                    sink.lock().unwrap().push(result.suite_name);
                }
            }));

        let run = orchestrator
            .run(vec![Suite::new("a", "cypress"), Suite::new("b", "cypress")])
            .await
            .unwrap();

        let mut seen = completed.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(run.exit_code(), crate::run_result::EXIT_FAILURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel_stops_in_flight_suites() {
        let jobs = Arc::new(MockJobs::new());
        let orchestrator = RunOrchestrator::new(services(&jobs, 2), RunOptions::default());
        let cancel = orchestrator.cancel_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        });

        let run = orchestrator
            .run(vec![Suite::new("a", "cypress"), Suite::new("b", "cypress")])
            .await
            .unwrap();

        assert_eq!(run.stopped_count(), 2);
        assert_eq!(jobs.total_stop_calls(), 2);
        assert_eq!(run.exit_code(), crate::run_result::EXIT_FAILURE);
    }
}
