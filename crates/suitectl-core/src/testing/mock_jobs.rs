//! Scripted job lifecycle for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use suitectl_proto::{
    ArtifactDownload, ArtifactPolicy, JobId, JobLifecycle, JobStatus, ServiceError, ServiceResult,
    Suite,
};

/// What a job reports once its scripted steps run out.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    Status(JobStatus),
    TransientError,
}

/// Sequence of answers a job gives to status reads.
#[derive(Debug)]
pub struct ScriptedPoll {
    steps: VecDeque<ServiceResult<JobStatus>>,
    fallback: Fallback,
}

impl Default for ScriptedPoll {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPoll {
    /// A job that reports `Running` forever.
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: Fallback::Status(JobStatus::Running),
        }
    }

    /// Reports each status in turn, then repeats the last one.
    pub fn statuses(statuses: &[JobStatus]) -> Self {
        let fallback = statuses
            .last()
            .map_or(Fallback::Status(JobStatus::Running), |s| Fallback::Status(*s));
        Self {
            steps: statuses.iter().map(|s| Ok(*s)).collect(),
            fallback,
        }
    }

    /// A job whose status can never be read.
    pub fn always_error() -> Self {
        Self {
            steps: VecDeque::new(),
            fallback: Fallback::TransientError,
        }
    }

    pub fn then_status(mut self, status: JobStatus) -> Self {
        self.steps.push_back(Ok(status));
        self
    }

    pub fn then_error(mut self, error: ServiceError) -> Self {
        self.steps.push_back(Err(error));
        self
    }

    fn next(&mut self) -> ServiceResult<JobStatus> {
        if let Some(step) = self.steps.pop_front() {
            return step;
        }
        match self.fallback {
            Fallback::Status(status) => Ok(status),
            Fallback::TransientError => Err(ServiceError::Transient("service unavailable".into())),
        }
    }
}

#[derive(Debug, Default)]
struct JobsState {
    scripts: HashMap<String, ScriptedPoll>,
    job_suites: HashMap<JobId, String>,
    started: Vec<String>,
    polls: HashMap<String, usize>,
    stops: HashMap<String, usize>,
    downloads: usize,
    active: HashSet<JobId>,
    peak_active: usize,
}

/// A [`JobLifecycle`] that answers from per-suite scripts.
///
/// Suites without a script run forever. The mock tracks how many jobs are
/// live at once: a job is live from `start_job` until it reports a terminal
/// status or is stopped.
#[derive(Debug, Default)]
pub struct MockJobs {
    state: Mutex<JobsState>,
    failing_start: HashSet<String>,
    failing_stop: bool,
    failing_downloads: bool,
}

impl MockJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, suite: &str, script: ScriptedPoll) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(suite.to_string(), script);
        self
    }

    pub fn with_failing_start(mut self, suite: &str) -> Self {
        self.failing_start.insert(suite.to_string());
        self
    }

    pub fn with_failing_stop(mut self) -> Self {
        self.failing_stop = true;
        self
    }

    pub fn with_failing_downloads(mut self) -> Self {
        self.failing_downloads = true;
        self
    }

    /// Total `start_job` calls that created a job.
    pub fn start_calls(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    /// Suites in the order their jobs were created.
    pub fn started_suites(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn poll_calls(&self, suite: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(suite)
            .copied()
            .unwrap_or(0)
    }

    pub fn stop_calls(&self, suite: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .stops
            .get(suite)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_stop_calls(&self) -> usize {
        self.state.lock().unwrap().stops.values().sum()
    }

    pub fn download_calls(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    /// Highest number of simultaneously live jobs.
    pub fn peak_active(&self) -> usize {
        self.state.lock().unwrap().peak_active
    }
}

#[async_trait]
impl JobLifecycle for MockJobs {
    async fn start_job(&self, suite: &Suite) -> ServiceResult<JobId> {
        if self.failing_start.contains(&suite.name) {
            return Err(ServiceError::Rejected(format!(
                "invalid configuration for {}",
                suite.name
            )));
        }

        let mut state = self.state.lock().unwrap();
        let job_id = JobId::new(format!("job-{}-{}", suite.name, state.started.len() + 1));
        state.job_suites.insert(job_id.clone(), suite.name.clone());
        state.started.push(suite.name.clone());
        state.active.insert(job_id.clone());
        state.peak_active = state.peak_active.max(state.active.len());
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatus> {
        let mut state = self.state.lock().unwrap();
        let suite = state
            .job_suites
            .get(job_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))?;
        *state.polls.entry(suite.clone()).or_default() += 1;

        let answer = state.scripts.entry(suite).or_default().next();
        if let Ok(status) = &answer
            && status.is_terminal()
        {
            state.active.remove(job_id);
        }
        answer
    }

    async fn stop_job(&self, job_id: &JobId) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        let suite = state
            .job_suites
            .get(job_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))?;
        *state.stops.entry(suite).or_default() += 1;
        state.active.remove(job_id);

        if self.failing_stop {
            return Err(ServiceError::Transient("stop endpoint unavailable".into()));
        }
        Ok(())
    }

    async fn download_artifacts(
        &self,
        job_id: &JobId,
        suite_name: &str,
        policy: &ArtifactPolicy,
    ) -> ServiceResult<ArtifactDownload> {
        self.state.lock().unwrap().downloads += 1;
        if self.failing_downloads {
            return Err(ServiceError::Http(format!("asset listing failed for {job_id}")));
        }
        Ok(ArtifactDownload {
            files: vec![policy.directory.join(suite_name).join(PathBuf::from("console.log"))],
            failed: Vec::new(),
        })
    }
}
