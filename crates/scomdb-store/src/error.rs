//! Error types for datastore access.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while querying the datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid connection string: {0}")]
    Config(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}
