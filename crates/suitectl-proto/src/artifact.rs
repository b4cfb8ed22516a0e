//! Artifact download policy and outcomes.

use crate::job::JobStatus;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When artifacts should be fetched after a job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadWhen {
    Always,
    Pass,
    Fail,
    #[default]
    Never,
}

impl DownloadWhen {
    /// Returns true if a job that ended in `status` should have its artifacts fetched.
    pub fn applies_to(self, status: JobStatus) -> bool {
        match self {
            DownloadWhen::Always => true,
            DownloadWhen::Never => false,
            DownloadWhen::Pass => status == JobStatus::Passed,
            DownloadWhen::Fail => status != JobStatus::Passed,
        }
    }
}

/// Compiled artifact file name globs.
///
/// Supports the usual glob syntax (`*`, `?`, `[ab]`, `{log,xml}`). An empty
/// matcher accepts every file.
#[derive(Debug, Clone)]
pub struct ArtifactMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ArtifactMatcher {
    /// Compiles `patterns` into a single glob set.
    pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            set: builder.build()?,
            patterns,
        })
    }

    /// The patterns as written.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_match(&self, file_name: &str) -> bool {
        self.patterns.is_empty() || self.set.is_match(file_name)
    }
}

impl Default for ArtifactMatcher {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

impl PartialEq for ArtifactMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

impl Eq for ArtifactMatcher {}

/// Artifact download settings for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPolicy {
    pub when: DownloadWhen,

    /// Only files matching at least one pattern are fetched.
    pub matcher: ArtifactMatcher,

    /// Root directory; each suite gets its own sub-directory.
    pub directory: PathBuf,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self {
            when: DownloadWhen::Never,
            matcher: ArtifactMatcher::default(),
            directory: PathBuf::from("artifacts"),
        }
    }
}

impl ArtifactPolicy {
    pub fn new(when: DownloadWhen, directory: impl Into<PathBuf>) -> Self {
        Self {
            when,
            matcher: ArtifactMatcher::default(),
            directory: directory.into(),
        }
    }

    /// Restricts downloads to files matching any of `patterns`.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matcher = ArtifactMatcher::new(patterns)?;
        Ok(self)
    }

    /// Returns true if a file with this name should be downloaded.
    pub fn wants(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }
}

/// What a downloader managed to fetch for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactDownload {
    pub files: Vec<PathBuf>,
    /// Names of artifacts that could not be fetched.
    pub failed: Vec<String>,
}

/// Artifact outcome recorded in a suite result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Downloaded { files: Vec<PathBuf> },
    Partial { files: Vec<PathBuf>, failed: Vec<String> },
    Failed { reason: String },
    #[default]
    Skipped,
}

impl From<ArtifactDownload> for ArtifactOutcome {
    fn from(download: ArtifactDownload) -> Self {
        if download.failed.is_empty() {
            ArtifactOutcome::Downloaded {
                files: download.files,
            }
        } else if download.files.is_empty() {
            ArtifactOutcome::Failed {
                reason: format!("{} artifact(s) failed to download", download.failed.len()),
            }
        } else {
            ArtifactOutcome::Partial {
                files: download.files,
                failed: download.failed,
            }
        }
    }
}
