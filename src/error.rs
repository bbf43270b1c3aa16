// Error handling module
// Defines the error taxonomy surfaced by the request pipeline

use thiserror::Error;

/// Errors that can occur while building, dispatching or decoding a request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network or connection failure during dispatch or token exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials were rejected and could not be recovered
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Response body could not be decoded in the selected accept mode
    #[error("Decode error: {0}")]
    Decode(String),

    /// Request descriptor cannot be turned into a wire request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::AuthFailure(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ApiError::Decode(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // Categorize the error for better debugging
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        ApiError::Transport(format!("{} (kind: {})", e, kind))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ApiError>;
