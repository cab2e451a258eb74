use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CidashError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No projects found")]
    NoProjects,

    #[error("GitLab API is not accessible: {0}")]
    Unreachable(String),

    #[error("The GitLab server is taking too long to respond: {0}")]
    Timeout(String),

    #[error("Rate limited by GitLab API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CidashError>;

impl CidashError {
    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-dictated retry delay, when one was supplied.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Status code the HTTP layer should respond with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NoProjects => 404,
            Self::RateLimited { .. } => 429,
            Self::Api { status, .. } => *status,
            Self::Network(_) => 502,
            Self::Unreachable(_) => 503,
            Self::Timeout(_) => 504,
            Self::Json(_) | Self::Io(_) => 500,
        }
    }
}
