//! Remote API error types.

use mirror_core::MirrorError;
use thiserror::Error;

/// Result type for remote API calls
pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// The API could not be reached at all
    #[error("API unavailable: {0}")]
    Unavailable(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// Network failures, timeouts and server-side errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::Unavailable(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

impl From<ApiError> for MirrorError {
    fn from(err: ApiError) -> Self {
        MirrorError::Api {
            status: err.status(),
            message: err.to_string(),
        }
    }
}
