//! Client error types.

use minilink_protocol::{StatusError, ValidationError};

/// Errors produced by printer requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("printer unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("printer rejected request: {0:?}")]
    Rejected(String),

    #[error("cancelled")]
    Cancelled,
}

impl ApiError {
    /// True for failures where the printer may simply be offline.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout | Self::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<StatusError> for ApiError {
    fn from(e: StatusError) -> Self {
        Self::Malformed(e.to_string())
    }
}
