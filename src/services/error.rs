//! Error taxonomy for external service calls.
//!
//! Callers retry only the transient classes; everything else surfaces
//! immediately (and is usually handled as "skip this candidate").

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("upstream returned status {0}")]
    Upstream(u16),
    #[error("not found")]
    NotFound,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Transient classes worth a bounded-backoff retry:
    /// rate limits, timeouts, connection resets and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::RateLimited | ServiceError::Timeout | ServiceError::Connection(_) => {
                true
            }
            ServiceError::Upstream(status) => *status >= 500,
            _ => false,
        }
    }

    /// Classify a reqwest error into the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_connect() {
            ServiceError::Connection(err.to_string())
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16())
        } else {
            ServiceError::Other(err.to_string())
        }
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ServiceError::RateLimited,
            404 => ServiceError::NotFound,
            s => ServiceError::Upstream(s),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
