//! Key/value settings and the sweep marker.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use super::connection::Database;
use super::models::now_millis;
use crate::error::{StorageError, WatcherError};
use crate::watcher::MarkerStore;
use crate::Result;

/// Settings key of the sweep marker.
pub const MARKER_KEY: &str = "last_image_processed_timestamp";

/// Read an integer setting.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_setting_i64(conn: &Connection, key: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Write an integer setting, replacing any previous value.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn set_setting_i64(conn: &Connection, key: &str, value: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value, now_millis()],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;
    Ok(())
}

/// Raise an integer setting to `value`, never lowering it.
///
/// Returns the stored value afterwards.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn raise_setting_i64(conn: &Connection, key: &str, value: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
            value = MAX(value, excluded.value),
            updated_at = excluded.updated_at",
        rusqlite::params![key, value, now_millis()],
    )
    .map_err(|e| StorageError::Database(e.to_string()))?;

    get_setting_i64(conn, key)?
        .ok_or_else(|| StorageError::not_found("setting", key).into())
}

/// `SQLite`-backed settings store with explicit commit semantics.
#[derive(Debug)]
pub struct SettingsStore {
    db: Database,
    staged: Mutex<Option<i64>>,
}

impl SettingsStore {
    /// Create a store over an initialized database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            staged: Mutex::new(None),
        }
    }

    /// Whether a marker was ever committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn has_marker(&self) -> Result<bool> {
        self.db
            .with_conn(|conn| Ok(get_setting_i64(conn, MARKER_KEY)?.is_some()))
    }

    /// Set the marker on first run so that nothing older than `marker` is
    /// swept. Does nothing if a marker already exists.
    ///
    /// Returns `true` if the marker was seeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn seed_marker(&self, marker: i64) -> Result<bool> {
        self.db.with_transaction(|conn| {
            if get_setting_i64(conn, MARKER_KEY)?.is_some() {
                return Ok(false);
            }
            set_setting_i64(conn, MARKER_KEY, marker)?;
            tracing::info!(marker, "Seeded sweep marker");
            Ok(true)
        })
    }
}

impl MarkerStore for SettingsStore {
    fn get_marker(&self) -> Result<i64> {
        self.db
            .with_conn(|conn| Ok(get_setting_i64(conn, MARKER_KEY)?.unwrap_or(0)))
    }

    fn set_marker(&self, marker: i64) {
        *self.staged.lock() = Some(marker);
    }

    fn commit(&self) -> Result<()> {
        let Some(marker) = self.staged.lock().take() else {
            return Ok(());
        };

        self.db
            .with_transaction(|conn| raise_setting_i64(conn, MARKER_KEY, marker))
            .map_err(|e| WatcherError::MarkerPersist {
                marker,
                reason: e.to_string(),
            })?;

        tracing::debug!(marker, "Marker committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrate;

    fn setup_store() -> SettingsStore {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();
        SettingsStore::new(db)
    }

    #[test]
    fn test_marker_defaults_to_zero() {
        let store = setup_store();
        assert_eq!(store.get_marker().unwrap(), 0);
        assert!(!store.has_marker().unwrap());
    }

    #[test]
    fn test_set_marker_is_not_durable_until_commit() {
        let store = setup_store();

        store.set_marker(150);
        assert_eq!(store.get_marker().unwrap(), 0);

        store.commit().unwrap();
        assert_eq!(store.get_marker().unwrap(), 150);
        assert!(store.has_marker().unwrap());
    }

    #[test]
    fn test_commit_without_staged_value_is_noop() {
        let store = setup_store();
        store.commit().unwrap();
        assert!(!store.has_marker().unwrap());
    }

    #[test]
    fn test_commit_never_lowers_marker() {
        let store = setup_store();

        store.set_marker(200);
        store.commit().unwrap();
        store.set_marker(120);
        store.commit().unwrap();

        assert_eq!(store.get_marker().unwrap(), 200);
    }

    #[test]
    fn test_seed_marker_only_once() {
        let store = setup_store();

        assert!(store.seed_marker(1_000).unwrap());
        assert!(!store.seed_marker(5_000).unwrap());
        assert_eq!(store.get_marker().unwrap(), 1_000);
    }

    #[test]
    fn test_generic_settings_round_trip() {
        let store = setup_store();
        store
            .db
            .with_conn(|conn| {
                assert_eq!(get_setting_i64(conn, "capture.interval")?, None);
                set_setting_i64(conn, "capture.interval", 30)?;
                set_setting_i64(conn, "capture.interval", 10)?;
                assert_eq!(get_setting_i64(conn, "capture.interval")?, Some(10));
                Ok(())
            })
            .unwrap();
    }
}
