//! Error types
//!
//! `StorageError` is what a document store adapter reports. `ApiError` is what
//! callers of the hierarchy layer see; every adapter failure reaching it is
//! wrapped as `StoreUnavailable` with the cause kept as its source.

use thiserror::Error;

/// Failures reported by a `DocumentStore` adapter
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Errors surfaced by hierarchy, index and cache operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("has descendants: {0}")]
    HasDescendants(String),

    #[error("cache is already enabled")]
    AlreadyEnabled,

    #[error("cache is already disabled")]
    AlreadyDisabled,

    #[error("cache is not enabled")]
    NotEnabled,

    #[error("document store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
