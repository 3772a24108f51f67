//! Error types for the Recyclus service clients

use thiserror::Error;

/// Result type alias for job store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when talking to the job store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the command
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with data of an unexpected shape
    #[error("unexpected reply from job store: {0}")]
    Decode(String),
}

impl StoreError {
    /// Check if the error is worth retrying after a back-off
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError {
            Self::Decode(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Errors that can occur when uploading artifacts
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP request failed before a response arrived
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The artifact store answered with a non-success status
    #[error("artifact store rejected upload (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// A selected file could not be opened
    #[error("failed to open artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Create a rejection error from status code and body
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }
}
