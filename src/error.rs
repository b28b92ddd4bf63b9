//! Report error types.

use thiserror::Error;

/// Errors surfaced by a report run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Missing input: {field} is blank")]
    EmptyInput { field: &'static str },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Invalid API endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Run cancelled before completion")]
    Cancelled,

    #[error("Reference table error: {0}")]
    ReferenceTable(String),

    #[error("Output error: {0}")]
    Sink(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ReportError::NetworkFailure(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ReportError::MalformedResponse(err.to_string())
        } else {
            ReportError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::MalformedResponse(err.to_string())
    }
}

impl ReportError {
    /// Check if the error came from the remote API rather than local input.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ReportError::MalformedResponse(_) | ReportError::NetworkFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
