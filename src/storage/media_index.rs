//! Media index: the catalogue of known media, swept by add-time.

use rusqlite::Connection;

use super::connection::Database;
use super::models::MediaRecord;
use crate::error::{StorageError, WatcherError};
use crate::watcher::MediaFeed;
use crate::Result;

/// Register a media file. Paths already in the index keep their original
/// add-time.
///
/// Returns `true` if the path was new.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn register_media(conn: &Connection, record: &MediaRecord) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO media_index (path, mime_type, added_at) VALUES (?, ?, ?)",
            rusqlite::params![record.path, record.mime_type, record.added_at],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(inserted > 0)
}

/// Drop a path from the index.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn forget_media(conn: &Connection, path: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM media_index WHERE path = ?", [path])
        .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(deleted > 0)
}

/// All rows added after `since`, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn query_added_since(conn: &Connection, since: i64) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT path, mime_type, added_at FROM media_index
             WHERE added_at > ? ORDER BY added_at DESC, id DESC",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let rows = stmt
        .query_map([since], |row| {
            Ok(MediaRecord {
                path: row.get(0)?,
                mime_type: row.get(1)?,
                added_at: row.get(2)?,
            })
        })
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(rows)
}

/// Highest add-time in the index, if any.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn latest_added_at(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row("SELECT MAX(added_at) FROM media_index", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Count indexed media.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_media(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM media_index", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Media feed backed by the `media_index` table.
#[derive(Debug, Clone)]
pub struct SqliteMediaFeed {
    db: Database,
}

impl SqliteMediaFeed {
    /// Create a feed over the shared database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

impl MediaFeed for SqliteMediaFeed {
    fn query(&self, since: i64) -> Result<Vec<MediaRecord>> {
        self.db
            .with_conn(|conn| query_added_since(conn, since))
            .map_err(|e| WatcherError::FeedUnavailable(e.to_string()).into())
    }
}
