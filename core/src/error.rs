/// Error types for the peer sync engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed connection string or request body
    #[error("Format error: {0}")]
    Format(String),

    /// Connection refused or name resolution failed
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote answered but the payload could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sled::Error> for ShareError {
    fn from(e: sled::Error) -> Self {
        ShareError::Storage(e.to_string())
    }
}

impl ShareError {
    /// Fixed HTTP status for each taxonomy entry
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            ShareError::Format(_) => StatusCode::BAD_REQUEST,
            ShareError::Unreachable(_) | ShareError::Protocol(_) => StatusCode::BAD_GATEWAY,
            ShareError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ShareError::NotFound(_) => StatusCode::NOT_FOUND,
            ShareError::Io(_)
            | ShareError::Serialization(_)
            | ShareError::Storage(_)
            | ShareError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failure reported by or on the way to a remote peer
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ShareError::Unreachable(_)
                | ShareError::Timeout(_)
                | ShareError::Protocol(_)
                | ShareError::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShareError>;
