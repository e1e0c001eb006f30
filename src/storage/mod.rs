//! `SQLite` storage.
//!
//! This module provides persistent storage for:
//! - Settings, including the sweep marker
//! - The media index swept by the watcher
//! - The processed-item ledger
//! - The dispatch queue

mod connection;
mod ledger;
mod media_index;
mod models;
mod queue;
mod schema;
mod settings;

pub use connection::Database;
pub use ledger::{count_processed, get_processed, have_processed, mark_processed, SqliteLedger};
pub use media_index::{
    count_media, forget_media, latest_added_at, query_added_since, register_media,
    SqliteMediaFeed,
};
pub use models::{now_millis, MediaRecord, ProcessedItem, QueueEntry};
pub use queue::{
    count_pending, enqueue_path, list_pending, peek_next, remove_entry, SqliteQueue,
};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use settings::{
    get_setting_i64, raise_setting_i64, set_setting_i64, SettingsStore, MARKER_KEY,
};

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!("Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
