//! Data models for storage operations.
//!
//! This module defines the rows kept in the database:
//! - Media index entries (the feed the watcher sweeps)
//! - Processed-item ledger entries
//! - Dispatch queue entries

use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One row of the media index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Absolute path of the media file.
    pub path: String,

    /// MIME type, if known (e.g. `image/jpeg`).
    pub mime_type: Option<String>,

    /// Milliseconds since the epoch at which the item entered the index.
    pub added_at: i64,
}

impl MediaRecord {
    /// Create a new media record.
    #[must_use]
    pub fn new(path: impl Into<String>, mime_type: Option<&str>, added_at: i64) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.map(String::from),
            added_at,
        }
    }
}

/// An item the downstream worker has accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    /// Stable identity (the file name).
    pub identity: String,

    /// Path the item was processed from.
    pub path: String,

    /// Milliseconds since the epoch when the item was recorded.
    pub processed_at: i64,
}

impl ProcessedItem {
    /// Create a ledger entry stamped with the current time.
    #[must_use]
    pub fn new(identity: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
            processed_at: now_millis(),
        }
    }
}

/// A pending entry on the dispatch queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Queue position (monotonic).
    pub id: i64,

    /// Absolute path to process.
    pub path: String,

    /// Milliseconds since the epoch when the path was enqueued.
    pub enqueued_at: i64,
}
