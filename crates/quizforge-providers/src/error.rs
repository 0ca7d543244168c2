//! Transport error types.

use thiserror::Error;

use quizforge_core::error::ServiceError;

/// Errors that can occur when talking to the question service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The service returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The configured base URL cannot be used.
    #[error("invalid service URL: {0}")]
    InvalidUrl(String),
}

impl ProviderError {
    /// Whether the failure is on the transport or server side rather than a
    /// refusal of this particular request.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_)
            | ProviderError::NetworkError(_)
            | ProviderError::InvalidResponse(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::InvalidUrl(_) => false,
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            ServiceError::Unavailable(err.to_string())
        } else {
            ServiceError::Rejected(err.to_string())
        }
    }
}
