//! Error types for the fumode-storage crate

use thiserror::Error;

/// Result type alias using `StorageError`
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while storing an object
#[derive(Error, Debug)]
pub enum StorageError {
    /// No file extension could be derived from the content type or name
    #[error("unable to determine file extension for {0:?}")]
    UnknownExtension(String),

    /// Object payload was empty
    #[error("object {0:?} has no content")]
    EmptyObject(String),

    /// Remote store rejected the upload
    #[error("remote store returned {status} for {key}")]
    Rejected { key: String, status: u16 },

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout { seconds: 30 }
        } else if err.is_connect() {
            StorageError::Connection(err.to_string())
        } else {
            StorageError::Http(err.to_string())
        }
    }
}
