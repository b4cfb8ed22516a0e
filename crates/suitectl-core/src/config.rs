//! Project configuration.
//!
//! A project file declares the region, the shared tunnel and metadata, the
//! artifact policy, and the list of suites. Loading goes through four steps,
//! which [`Project::load`] runs in order:
//!
//! 1. [`Project::apply_overrides`]: CLI-level overrides (env injection,
//!    forced test environment, region, concurrency, suite filter)
//! 2. [`Project::set_defaults`]: per-suite fallbacks from `defaults` and `sauce`
//! 3. [`Project::validate`]: structural checks, no network
//! 4. [`Project::expand_metadata_env`]: `$VAR` expansion in build name and tags
//!
//! [`Project::into_suites`] then yields the resolved suites.

use crate::gate::ConcurrencyLimits;
use crate::region::{Region, UnknownRegion};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use suitectl_proto::{
    ArtifactPolicy, DownloadWhen, ExecutionMode, JobMetadata, Suite, TunnelRef,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Default location of the project file.
pub const DEFAULT_CONFIG_PATH: &str = ".sauce/config.yml";

/// Errors raised while loading or validating a project.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no sauce region set")]
    MissingRegion,

    #[error(transparent)]
    UnknownRegion(#[from] UnknownRegion),

    #[error("no suites defined")]
    NoSuites,

    #[error("suite at position {0} has no name")]
    UnnamedSuite(usize),

    #[error("duplicate suite name: {0}")]
    DuplicateSuite(String),

    #[error("suite name '{0}' is invalid")]
    SuiteNotFound(String),

    #[error("suite '{0}' runs in docker mode but has no image")]
    MissingImage(String),

    #[error("invalid duration '{0}' (expected e.g. 500ms, 45s, 10m, 1h30m)")]
    InvalidDuration(String),

    #[error("invalid test environment '{0}' (expected docker or sauce)")]
    InvalidTestEnv(String),

    #[error("invalid env override '{0}', expected KEY=VALUE")]
    InvalidEnv(String),

    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("invalid artifact pattern: {0}")]
    ArtifactPattern(#[from] globset::Error),
}

/// Where a suite runs, as written in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestEnv {
    #[serde(alias = "local")]
    Docker,
    Sauce,
}

impl TestEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestEnv::Docker => "docker",
            TestEnv::Sauce => "sauce",
        }
    }
}

impl fmt::Display for TestEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "local" => Ok(TestEnv::Docker),
            "sauce" => Ok(TestEnv::Sauce),
            _ => Err(ConfigError::InvalidTestEnv(s.to_string())),
        }
    }
}

impl From<TestEnv> for ExecutionMode {
    fn from(env: TestEnv) -> Self {
        match env {
            TestEnv::Docker => ExecutionMode::Local,
            TestEnv::Sauce => ExecutionMode::Remote,
        }
    }
}

/// Parses durations like `500ms`, `45s`, `10m`, `1h30m`, or bare seconds.
///
/// A leading `-` yields zero, which callers treat as "no timeout".
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let total = if body.chars().all(|c| c.is_ascii_digit()) {
        Duration::from_secs(body.parse().map_err(|_| invalid())?)
    } else {
        let mut total = Duration::ZERO;
        let mut rest = body;
        while !rest.is_empty() {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return Err(invalid());
            }
            let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
            rest = &rest[digits..];

            let (unit, len) = if rest.starts_with("ms") {
                (Duration::from_millis(1), 2)
            } else if rest.starts_with('h') {
                (Duration::from_secs(3600), 1)
            } else if rest.starts_with('m') {
                (Duration::from_secs(60), 1)
            } else if rest.starts_with('s') {
                (Duration::from_secs(1), 1)
            } else {
                return Err(invalid());
            };
            rest = &rest[len..];

            let amount = u32::try_from(value)
                .ok()
                .and_then(|v| unit.checked_mul(v))
                .ok_or_else(invalid)?;
            total = total.checked_add(amount).ok_or_else(invalid)?;
        }
        total
    };

    Ok(if negative { Duration::ZERO } else { total })
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(i64),
        Fraction(f64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(de)?;
    Ok(match raw {
        None => None,
        Some(Raw::Secs(n)) => Some(Duration::from_secs(n.max(0).unsigned_abs())),
        Some(Raw::Fraction(f)) => Some(
            Duration::try_from_secs_f64(f.max(0.0)).map_err(serde::de::Error::custom)?,
        ),
        Some(Raw::Text(s)) => Some(parse_duration(&s).map_err(serde::de::Error::custom)?),
    })
}

/// Account and grid settings shared by every suite.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SauceConfig {
    #[serde(default)]
    pub region: Option<String>,

    /// Caps the concurrency the account allows.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Hard clamp on concurrency.
    #[serde(default)]
    pub concurrency_ceiling: Option<usize>,

    #[serde(default)]
    pub tunnel: Option<TunnelRef>,

    #[serde(default)]
    pub metadata: JobMetadata,
}

/// Fallbacks applied to every suite.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub mode: Option<TestEnv>,

    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Artifact download settings as written in the project file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub when: DownloadWhen,

    /// File name globs; empty means every file.
    #[serde(rename = "match")]
    pub patterns: Vec<String>,

    pub directory: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let policy = ArtifactPolicy::default();
        Self {
            when: policy.when,
            patterns: Vec::new(),
            directory: policy.directory,
        }
    }
}

/// A suite as declared in the project file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mode: Option<TestEnv>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub tunnel: Option<TunnelRef>,

    /// Framework-specific keys, passed through to the grid untouched.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A parsed project file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub api_version: String,

    /// Test framework of every suite (`cypress`, `playwright`, ...).
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub sauce: SauceConfig,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub suites: Vec<SuiteConfig>,
}

/// Command-line overrides applied on top of the project file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Injected into every suite; wins over values from the file.
    pub env: BTreeMap<String, String>,

    /// Forces every suite into one test environment.
    pub test_env: Option<TestEnv>,

    pub region: Option<String>,
    pub concurrency: Option<usize>,
    pub concurrency_ceiling: Option<usize>,

    /// Restricts the run to a single named suite.
    pub suite: Option<String>,
}

impl Overrides {
    /// Parses a `KEY=VALUE` pair into the env overrides.
    pub fn push_env(&mut self, pair: &str) -> Result<(), ConfigError> {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidEnv(pair.to_string()))?;
        self.env.insert(key.trim().to_string(), value.to_string());
        Ok(())
    }
}

impl Project {
    /// Reads and parses a project file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded project file");
        content.parse()
    }

    /// Reads, resolves, and validates a project file in one go.
    pub fn load(path: impl AsRef<Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut project = Self::from_file(path)?;
        project.apply_overrides(overrides)?;
        project.set_defaults();
        project.validate()?;
        project.expand_metadata_env()?;
        Ok(project)
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(name) = &overrides.suite {
            let suite = self
                .suites
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| ConfigError::SuiteNotFound(name.clone()))?;
            self.suites = vec![suite];
        }

        if !overrides.env.is_empty() {
            for suite in &mut self.suites {
                suite
                    .env
                    .extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        if let Some(test_env) = overrides.test_env {
            self.defaults.mode = Some(test_env);
            for suite in &mut self.suites {
                suite.mode = Some(test_env);
            }
        }

        if let Some(region) = &overrides.region {
            self.sauce.region = Some(region.clone());
        }
        if let Some(concurrency) = overrides.concurrency {
            self.sauce.concurrency = Some(concurrency);
        }
        if let Some(ceiling) = overrides.concurrency_ceiling {
            self.sauce.concurrency_ceiling = Some(ceiling);
        }
        Ok(())
    }

    /// Fills in per-suite values left unset in the file.
    pub fn set_defaults(&mut self) {
        let default_mode = self.defaults.mode.unwrap_or(TestEnv::Sauce);
        self.defaults.mode = Some(default_mode);

        if self.sauce.concurrency == Some(0) {
            warn!("Concurrency of 0 requested, using 1");
            self.sauce.concurrency = Some(1);
        }

        for suite in &mut self.suites {
            if suite.timeout.is_none_or(|t| t.is_zero()) {
                suite.timeout = self.defaults.timeout;
            }
            if suite.mode.is_none() {
                suite.mode = Some(default_mode);
            }
            if suite.tunnel.is_none() {
                suite.tunnel = self.sauce.tunnel.clone();
            }
        }
    }

    /// Checks the project for structural problems. Never touches the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region()?;

        if self.suites.is_empty() {
            return Err(ConfigError::NoSuites);
        }

        let mut names = HashSet::new();
        for (i, suite) in self.suites.iter().enumerate() {
            if suite.name.trim().is_empty() {
                return Err(ConfigError::UnnamedSuite(i));
            }
            if !names.insert(suite.name.as_str()) {
                return Err(ConfigError::DuplicateSuite(suite.name.clone()));
            }
            let local = suite.mode == Some(TestEnv::Docker);
            if local && suite.image.as_deref().is_none_or(|i| i.trim().is_empty()) {
                return Err(ConfigError::MissingImage(suite.name.clone()));
            }
        }

        self.artifact_policy()?;
        Ok(())
    }

    /// The configured region.
    pub fn region(&self) -> Result<Region, ConfigError> {
        let name = self
            .sauce
            .region
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::MissingRegion)?;
        Ok(name.parse()?)
    }

    pub fn concurrency_limits(&self) -> ConcurrencyLimits {
        ConcurrencyLimits {
            requested: self.sauce.concurrency,
            ceiling: self.sauce.concurrency_ceiling,
        }
    }

    /// Compiles the artifact download settings.
    pub fn artifact_policy(&self) -> Result<ArtifactPolicy, ConfigError> {
        let download = &self.artifacts.download;
        Ok(ArtifactPolicy::new(download.when, download.directory.clone())
            .with_patterns(download.patterns.iter().cloned())?)
    }

    /// Expands `$VAR` and `${VAR}` in the build name and tags from the
    /// process environment. Unset variables expand to nothing.
    pub fn expand_metadata_env(&mut self) -> Result<(), ConfigError> {
        self.expand_metadata_with(|key| std::env::var(key).ok())
    }

    /// Like [`Self::expand_metadata_env`], resolving variables through `lookup`.
    pub fn expand_metadata_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .map_err(|e| ConfigError::Pattern(e.to_string()))?;
        let expand = |value: &str| -> String {
            pattern
                .replace_all(value, |caps: &regex::Captures<'_>| {
                    let key = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map_or("", |m| m.as_str());
                    lookup(key).unwrap_or_default()
                })
                .into_owned()
        };

        let metadata = &mut self.sauce.metadata;
        if let Some(build) = &metadata.build {
            metadata.build = Some(expand(build));
        }
        metadata.tags = metadata.tags.iter().map(|t| expand(t)).collect();
        Ok(())
    }

    /// Converts the resolved project into suites ready to run.
    pub fn into_suites(self) -> Vec<Suite> {
        let Project {
            kind,
            sauce,
            defaults,
            suites,
            ..
        } = self;
        let default_mode = defaults.mode.unwrap_or(TestEnv::Sauce);

        suites
            .into_iter()
            .map(|config| Suite {
                name: config.name,
                framework: kind.clone(),
                payload: if config.payload.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::Value::Object(config.payload)
                },
                timeout: config.timeout.filter(|t| !t.is_zero()),
                tunnel: config.tunnel,
                env: config.env,
                mode: config.mode.unwrap_or(default_mode).into(),
                image: config.image,
                metadata: sauce.metadata.clone(),
            })
            .collect()
    }
}

impl FromStr for Project {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(s)?)
    }
}
