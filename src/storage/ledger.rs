//! Processed-item ledger.
//!
//! The capture worker writes entries; the dispatcher only reads them.

use rusqlite::{Connection, OptionalExtension};

use super::connection::Database;
use super::models::ProcessedItem;
use crate::error::StorageError;
use crate::watcher::Ledger;
use crate::Result;

/// Check whether an identity is recorded.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn have_processed(conn: &Connection, identity: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM processed_items WHERE identity = ?",
            [identity],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(found.is_some())
}

/// Record an item as processed. Re-recording an identity keeps the first entry.
///
/// Returns `true` if a new entry was written.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn mark_processed(conn: &Connection, item: &ProcessedItem) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO processed_items (identity, path, processed_at) VALUES (?, ?, ?)",
            rusqlite::params![item.identity, item.path, item.processed_at],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(inserted > 0)
}

/// Fetch a ledger entry.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_processed(conn: &Connection, identity: &str) -> Result<Option<ProcessedItem>> {
    conn.query_row(
        "SELECT identity, path, processed_at FROM processed_items WHERE identity = ?",
        [identity],
        |row| {
            Ok(ProcessedItem {
                identity: row.get(0)?,
                path: row.get(1)?,
                processed_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Count ledger entries.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_processed(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM processed_items", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Ledger reader over the shared database.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    db: Database,
}

impl SqliteLedger {
    /// Create a ledger reader.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Ledger for SqliteLedger {
    fn have_processed(&self, identity: &str) -> Result<bool> {
        self.db.with_conn(|conn| have_processed(conn, identity))
    }
}
