//! Error types for management API calls

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for management API calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the management API
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the connection broke
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code
    #[error("{path} returned {status}: {body}")]
    Status {
        path: String,
        status: StatusCode,
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// The configured server URL can not be used
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// A notification channel payload carried no known config block
    #[error("unknown notification channel type for channel {channel_id}")]
    UnknownChannelType { channel_id: String },
}

impl ClientError {
    /// Status code of the failed response, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}
