//! `SQLite` database connection management.
//!
//! Provides a connection wrapper configured for:
//! - WAL mode, so the watcher can read the ledger while the capture worker writes
//! - A busy timeout instead of immediate `SQLITE_BUSY` failures
//! - Shared access via `parking_lot::Mutex`

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;
use crate::Result;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper.
///
/// Clone is cheap - it just clones the Arc.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open a database at the given path.
    ///
    /// Creates the database file and parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StorageError::Database(format!("failed to open database: {e}")))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string_lossy().to_string(),
        };

        db.configure()?;

        Ok(db)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Database(format!("failed to open in-memory database: {e}"))
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: ":memory:".to_string(),
        };

        db.configure()?;

        Ok(db)
    }

    fn configure(&self) -> Result<()> {
        {
            let conn = self.conn.lock();

            conn.busy_timeout(BUSY_TIMEOUT)
                .map_err(|e| StorageError::Database(format!("failed to set busy timeout: {e}")))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA foreign_keys = ON;
                ",
            )
            .map_err(|e| StorageError::Database(format!("failed to configure database: {e}")))?;
        }

        tracing::debug!(path = %self.path, "Database configured with WAL mode");

        Ok(())
    }

    /// Execute a function with exclusive database access.
    ///
    /// # Errors
    ///
    /// Returns an error if the function fails.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside an immediate transaction.
    ///
    /// Commits when `f` succeeds, rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails or if the function fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::Database(format!("failed to begin transaction: {e}")))?;

        match f(&conn) {
            Ok(result) => {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(StorageError::Database(format!("failed to commit: {e}")).into());
                }
                Ok(result)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                .map_err(|e| StorageError::from(e).into())
        })
        .unwrap()
    }

    fn create_table(db: &Database) {
        db.with_conn(|conn| {
            conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
                .map_err(StorageError::from)?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);
        assert_eq!(count_rows(&db), 0);
        assert!(format!("{db:?}").contains(":memory:"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("lifestream.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        create_table(&db);
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_with_transaction_commit() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);

        db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])
                .map_err(StorageError::from)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db), 1);
    }

    #[test]
    fn test_with_transaction_rollback() {
        let db = Database::open_in_memory().unwrap();
        create_table(&db);

        let result: Result<()> = db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])
                .map_err(StorageError::from)?;
            Err(crate::Error::internal("simulated failure"))
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_wal_mode_on_disk() {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path().join("wal.db")).unwrap();

        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| StorageError::from(e).into())
            })
            .unwrap();

        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_clone_shares_connection() {
        let db1 = Database::open_in_memory().unwrap();
        create_table(&db1);

        let db2 = db1.clone();
        db2.with_conn(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (7)", [])
                .map_err(StorageError::from)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count_rows(&db1), 1);
    }
}
