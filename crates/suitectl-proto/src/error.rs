//! Error types returned by the remote and local execution services.

use thiserror::Error;

/// Errors reported by a service implementation.
///
/// The orchestrator only cares about one distinction: whether retrying the
/// same call later could succeed. See [`ServiceError::is_transient`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Returns true if the failed call may succeed when retried.
    ///
    /// Network level failures (`Http`) count as transient; anything the
    /// service answered explicitly does not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_) | ServiceError::Http(_))
    }
}

/// Result type alias using [`ServiceError`].
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
