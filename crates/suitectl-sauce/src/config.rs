use crate::error::{Result, SauceError};
use std::env;
use std::time::Duration;
use suitectl_core::Region;

pub const USERNAME_ENV: &str = "SAUCE_USERNAME";
pub const ACCESS_KEY_ENV: &str = "SAUCE_ACCESS_KEY";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SauceConfig {
    pub username: String,
    pub access_key: String,
    pub region: Region,

    /// API root. Defaults to the region's endpoint.
    pub base_url: String,

    pub request_timeout: Duration,
}

impl std::fmt::Debug for SauceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SauceConfig")
            .field("username", &self.username)
            .field("access_key", &"<redacted>")
            .field("region", &self.region)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SauceConfig {
    /// Load credentials from environment variables
    pub fn from_env(region: Region) -> Result<Self> {
        let username = env::var(USERNAME_ENV)
            .map_err(|_| SauceError::ConfigError(format!("{USERNAME_ENV} not set")))?;
        let access_key = env::var(ACCESS_KEY_ENV)
            .map_err(|_| SauceError::ConfigError(format!("{ACCESS_KEY_ENV} not set")))?;

        Self::new(username, access_key, region)
    }

    /// Create a new configuration with explicit credentials
    pub fn new(
        username: impl Into<String>,
        access_key: impl Into<String>,
        region: Region,
    ) -> Result<Self> {
        let username = username.into();
        let access_key = access_key.into();
        if username.trim().is_empty() || access_key.trim().is_empty() {
            return Err(SauceError::ConfigError(
                "credentials must not be empty".to_string(),
            ));
        }

        Ok(Self {
            username,
            access_key,
            region,
            base_url: region.api_base_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
