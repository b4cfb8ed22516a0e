use reqwest::StatusCode;
use suitectl_proto::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SauceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: StatusCode, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SauceError>;

impl SauceError {
    pub(crate) fn api(status: StatusCode, action: &str, body: &str) -> Self {
        SauceError::ApiError {
            status,
            message: format!("Failed to {}: {}", action, body.trim()),
        }
    }
}

/// Maps an HTTP status onto the orchestrator's error taxonomy.
pub fn classify_status(status: StatusCode, message: String) -> ServiceError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::Transient(format!("{status}: {message}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ServiceError::Unauthorized(format!("{status}: {message}"))
    } else if status == StatusCode::NOT_FOUND {
        ServiceError::NotFound(message)
    } else {
        ServiceError::Rejected(format!("{status}: {message}"))
    }
}

impl From<SauceError> for ServiceError {
    fn from(err: SauceError) -> Self {
        match err {
            SauceError::ApiError { status, message } => classify_status(status, message),
            SauceError::HttpError(e) if e.is_decode() => ServiceError::Decode(e.to_string()),
            SauceError::HttpError(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ServiceError::Transient(e.to_string())
            }
            SauceError::HttpError(e) => ServiceError::Http(e.to_string()),
            SauceError::ConfigError(message) => ServiceError::Rejected(message),
            SauceError::IoError(e) => ServiceError::Io(e),
        }
    }
}
