//! Dispatch queue drained by the capture worker.

use rusqlite::{Connection, OptionalExtension};

use super::connection::Database;
use super::models::{now_millis, QueueEntry};
use crate::error::{StorageError, WatcherError};
use crate::watcher::DispatchQueue;
use crate::Result;

/// Append a path. A path that is still pending is not queued twice.
///
/// Returns `true` if a new entry was added.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn enqueue_path(conn: &Connection, path: &str) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO dispatch_queue (path, enqueued_at) VALUES (?, ?)",
            rusqlite::params![path, now_millis()],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(inserted > 0)
}

/// Oldest pending entry, without removing it.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn peek_next(conn: &Connection) -> Result<Option<QueueEntry>> {
    conn.query_row(
        "SELECT id, path, enqueued_at FROM dispatch_queue ORDER BY id ASC LIMIT 1",
        [],
        |row| {
            Ok(QueueEntry {
                id: row.get(0)?,
                path: row.get(1)?,
                enqueued_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Remove an entry once it has been handled.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn remove_entry(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM dispatch_queue WHERE id = ?", [id])
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(())
}

/// List pending paths in queue order.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_pending(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT path FROM dispatch_queue ORDER BY id ASC")
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let paths = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(paths)
}

/// Count pending entries.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_pending(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM dispatch_queue", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Dispatch queue over the shared database.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    db: Database,
}

impl SqliteQueue {
    /// Create a queue handle.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DispatchQueue for SqliteQueue {
    fn enqueue(&self, path: &str) -> Result<()> {
        let added = self
            .db
            .with_conn(|conn| enqueue_path(conn, path))
            .map_err(|e| WatcherError::Enqueue {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        if !added {
            tracing::debug!(path, "Path already pending on the queue");
        }
        Ok(())
    }
}
