//! Remote grid integration for suitectl
//!
//! This crate provides a REST client for the remote test grid. The
//! [`SauceClient`] implements the job, concurrency, and tunnel capabilities
//! the orchestrator consumes, and maps HTTP failures onto
//! [`suitectl_proto::ServiceError`] so that retry decisions stay in the core.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use suitectl_core::{Region, RunOptions, RunOrchestrator, Services};
//! use suitectl_sauce::SauceClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from SAUCE_USERNAME / SAUCE_ACCESS_KEY
//!     let client = Arc::new(SauceClient::from_env(Region::UsWest1)?);
//!
//!     let services = Services::remote(client.clone(), client.clone(), client);
//!     let orchestrator = RunOrchestrator::new(services, RunOptions::default());
//!     let run = orchestrator.run(Vec::new()).await;
//!     println!("{run:?}");
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod types;

// Re-export main types
pub use api::SauceClient;
pub use config::{ACCESS_KEY_ENV, SauceConfig, USERNAME_ENV};
pub use error::{Result, SauceError, classify_status};
pub use types::{JobDetails, TunnelInfo};
