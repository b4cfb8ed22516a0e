//! # suitectl-proto
//!
//! Shared types, error definitions, and traits for suitectl.
//!
//! This crate provides the foundational abstractions used across all suitectl
//! crates, including:
//! - The suite and job data model
//! - Per-suite results and artifact outcomes
//! - The capability traits the orchestrator consumes (job control,
//!   concurrency lookup, tunnel lookup, local execution)

pub mod artifact;
pub mod error;
pub mod job;
pub mod result;
pub mod service;
pub mod suite;

pub use artifact::{
    ArtifactDownload, ArtifactMatcher, ArtifactOutcome, ArtifactPolicy, DownloadWhen,
};
pub use error::{ServiceError, ServiceResult};
pub use job::{JobId, JobStatus};
pub use result::SuiteResult;
pub use service::{ConcurrencyReader, JobLifecycle, LocalRunner, TunnelService};
pub use suite::{ExecutionMode, JobMetadata, Suite, TunnelRef};
