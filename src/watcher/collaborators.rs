//! Interfaces the dispatcher talks to.
//!
//! The dispatcher receives each of these at construction time, which keeps
//! the sweep logic independent of `SQLite` and lets tests substitute fakes.

use crate::storage::MediaRecord;
use crate::Result;

/// Source of media index rows.
pub trait MediaFeed: Send + Sync {
    /// Return rows added after `since`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be queried.
    fn query(&self, since: i64) -> Result<Vec<MediaRecord>>;
}

/// Read side of the processed-item ledger.
pub trait Ledger: Send + Sync {
    /// Whether an item with this identity was already handed downstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    fn have_processed(&self, identity: &str) -> Result<bool>;
}

/// Destination for qualifying item paths.
pub trait DispatchQueue: Send + Sync {
    /// Append a path for downstream processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the path could not be queued.
    fn enqueue(&self, path: &str) -> Result<()>;
}

/// Persistent home of the sweep marker.
///
/// `set_marker` only stages a value; nothing is durable until `commit`
/// succeeds.
pub trait MarkerStore: Send + Sync {
    /// Durable marker value, `0` if none was ever committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_marker(&self) -> Result<i64>;

    /// Stage a new marker value.
    fn set_marker(&self, marker: i64);

    /// Make the staged value durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be written. The staged value
    /// is discarded either way.
    fn commit(&self) -> Result<()>;
}

/// Wakes the downstream worker.
pub trait CaptureKick: Send + Sync {
    /// Signal that new work is available.
    fn kick(&self);
}
