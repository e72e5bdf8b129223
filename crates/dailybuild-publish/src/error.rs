//! Error types for dailybuild-publish

use thiserror::Error;

/// Result type for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors that can occur while notifying or uploading
#[derive(Error, Debug)]
pub enum PublishError {
    /// A credential needed by the client is missing
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Slack accepted the request but reported `ok: false`
    #[error("Slack API error: {0}")]
    Slack(String),

    /// Endpoint URL could not be used
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// Request signing failed
    #[error("signing failed: {0}")]
    Signing(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Http(err.to_string())
    }
}
