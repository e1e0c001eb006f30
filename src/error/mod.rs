//! Error types and Result aliases for LifeStream.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using LifeStream's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for LifeStream operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database/storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Watcher, feed or dispatch error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Record not found.
    #[error("not found: {entity} with id '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Errors raised while watching, reading the feed or dispatching items.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The media feed could not be queried.
    #[error("media feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The advanced marker could not be made durable.
    #[error("failed to persist marker {marker}: {reason}")]
    MarkerPersist { marker: i64, reason: String },

    /// The host refused a liveness hold.
    #[error("liveness hold refused: {0}")]
    Liveness(String),

    /// An item could not be put on the dispatch queue.
    #[error("failed to enqueue '{path}': {reason}")]
    Enqueue { path: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
