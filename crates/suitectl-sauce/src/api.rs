use crate::config::SauceConfig;
use crate::error::{Result, SauceError};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use suitectl_core::Region;
use suitectl_proto::{
    ArtifactDownload, ArtifactPolicy, ConcurrencyReader, JobId, JobLifecycle, JobStatus,
    ServiceResult, Suite, TunnelRef, TunnelService,
};
use tracing::{debug, info, warn};

const JOBS_PATH: &str = "v1/testrunner/jobs";

/// REST client for the remote grid.
pub struct SauceClient {
    client: Client,
    config: SauceConfig,
}

impl SauceClient {
    /// Create a new client with configuration
    pub fn new(config: SauceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("suitectl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client from environment variables
    pub fn from_env(region: Region) -> Result<Self> {
        let config = SauceConfig::from_env(region)?;
        Self::new(config)
    }

    pub fn config(&self) -> &SauceConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SauceError::api(status, action, &body));
        }
        Ok(response)
    }

    /// Submit a suite as a new job
    pub async fn start(&self, suite: &Suite) -> Result<String> {
        info!("Starting job for suite {}", suite.name);

        let response = self
            .client
            .post(self.url(JOBS_PATH))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .json(&StartJobRequest::from(suite))
            .send()
            .await?;
        let response = Self::check(response, "start job").await?;

        let started: StartJobResponse = response.json().await?;
        debug!("Job {} created for suite {}", started.id, suite.name);
        Ok(started.id)
    }

    /// Fetch the current details of a job
    pub async fn job(&self, job_id: &str) -> Result<JobDetails> {
        let response = self
            .client
            .get(self.url(&format!("{JOBS_PATH}/{job_id}")))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await?;
        let response = Self::check(response, "read job status").await?;

        Ok(response.json().await?)
    }

    /// Request that a job stop
    pub async fn stop(&self, job_id: &str) -> Result<()> {
        info!("Stopping job {}", job_id);

        let response = self
            .client
            .put(self.url(&format!("{JOBS_PATH}/{job_id}/stop")))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await?;
        Self::check(response, "stop job").await?;
        Ok(())
    }

    /// Read the account's allowed concurrency
    pub async fn concurrency(&self) -> Result<usize> {
        let path = format!("rest/v1.2/users/{}/concurrency", self.config.username);
        let response = self
            .client
            .get(self.url(&path))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await?;
        let response = Self::check(response, "read concurrency").await?;

        let concurrency: ConcurrencyResponse = response.json().await?;
        Ok(concurrency.allowed())
    }

    /// List the tunnels owned by `owner`
    pub async fn tunnels(&self, owner: &str) -> Result<Vec<TunnelInfo>> {
        let response = self
            .client
            .get(self.url(&format!("rest/v1/{owner}/tunnels")))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .query(&[("full", "true")])
            .send()
            .await?;
        let response = Self::check(response, "list tunnels").await?;

        Ok(response.json().await?)
    }

    /// List the asset file names attached to a job
    pub async fn list_assets(&self, job_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&format!("{JOBS_PATH}/{job_id}/assets")))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await?;
        let response = Self::check(response, "list assets").await?;

        let assets: AssetList = response.json().await?;
        Ok(assets.files)
    }

    /// Download one asset into `directory`
    pub async fn download_asset(
        &self,
        job_id: &str,
        name: &str,
        directory: &Path,
    ) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| SauceError::ConfigError(format!("invalid asset name: {name}")))?;

        let response = self
            .client
            .get(self.url(&format!("{JOBS_PATH}/{job_id}/assets/{name}")))
            .basic_auth(&self.config.username, Some(&self.config.access_key))
            .send()
            .await?;
        let response = Self::check(response, "download asset").await?;
        let bytes = response.bytes().await?;

        let target = directory.join(file_name);
        tokio::fs::write(&target, &bytes).await?;
        debug!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }
}

#[async_trait]
impl JobLifecycle for SauceClient {
    async fn start_job(&self, suite: &Suite) -> ServiceResult<JobId> {
        Ok(JobId::new(self.start(suite).await?))
    }

    async fn job_status(&self, job_id: &JobId) -> ServiceResult<JobStatus> {
        let details = self.job(job_id.as_str()).await?;
        if let Some(error) = &details.error {
            debug!("Job {} reported: {}", details.id, error);
        }
        Ok(details.job_status())
    }

    async fn stop_job(&self, job_id: &JobId) -> ServiceResult<()> {
        Ok(self.stop(job_id.as_str()).await?)
    }

    async fn download_artifacts(
        &self,
        job_id: &JobId,
        suite_name: &str,
        policy: &ArtifactPolicy,
    ) -> ServiceResult<ArtifactDownload> {
        let names = self.list_assets(job_id.as_str()).await?;
        let directory = policy.directory.join(suite_name);
        tokio::fs::create_dir_all(&directory).await?;

        let mut download = ArtifactDownload::default();
        for name in names.iter().filter(|n| policy.wants(n)) {
            match self.download_asset(job_id.as_str(), name, &directory).await {
                Ok(path) => download.files.push(path),
                Err(e) => {
                    warn!("Failed to download {} for suite {}: {}", name, suite_name, e);
                    download.failed.push(name.clone());
                }
            }
        }
        Ok(download)
    }
}

#[async_trait]
impl ConcurrencyReader for SauceClient {
    async fn allowed_concurrency(&self) -> ServiceResult<usize> {
        Ok(self.concurrency().await?)
    }
}

#[async_trait]
impl TunnelService for SauceClient {
    async fn tunnel_ready(&self, tunnel: &TunnelRef) -> ServiceResult<bool> {
        let owner = tunnel.owner.as_deref().unwrap_or(&self.config.username);
        let tunnels = self.tunnels(owner).await?;
        Ok(tunnels
            .iter()
            .any(|t| t.name == tunnel.name && t.is_running()))
    }
}
