//! Media cataloguer: keeps the media index in step with the filesystem.
//!
//! Add-times come from a per-indexer clock that never repeats or goes
//! backwards, and each row is inserted while that clock is held. A sweep that
//! has seen add-time `t` can therefore never miss a row registered later.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use walkdir::WalkDir;

use super::events::EventBatch;
use super::filter::PathFilter;
use crate::config::absolute_path;
use crate::storage::{
    forget_media, latest_added_at, now_millis, register_media, Database, MediaRecord,
    SettingsStore,
};
use crate::Result;

/// Registers and forgets media in the index.
#[derive(Debug)]
pub struct MediaIndexer {
    db: Database,
    roots: Vec<PathBuf>,
    clock: Mutex<i64>,
}

impl MediaIndexer {
    /// Create an indexer for the given roots, resuming the clock from the
    /// newest row already indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn new(db: Database, roots: Vec<PathBuf>) -> Result<Self> {
        let roots = roots
            .iter()
            .map(|root| absolute_path(root))
            .collect::<Result<_>>()?;
        let latest = db.with_conn(latest_added_at)?.unwrap_or(0);
        Ok(Self {
            db,
            roots,
            clock: Mutex::new(latest),
        })
    }

    /// Highest add-time handed out so far.
    #[must_use]
    pub fn high_water(&self) -> i64 {
        *self.clock.lock()
    }

    /// Apply a batch of filesystem events.
    ///
    /// Returns the number of newly registered files.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be updated.
    pub fn register_batch(&self, batch: &EventBatch) -> Result<usize> {
        let mut registered = 0;

        for path in &batch.appeared {
            if path.is_file() && self.register(path)? {
                registered += 1;
            }
        }

        for path in &batch.vanished {
            let path = absolute_path(path)?;
            let path_str = path.to_string_lossy();
            if self.db.with_conn(|conn| forget_media(conn, &path_str))? {
                tracing::debug!(path = %path.display(), "Removed vanished media from index");
            }
        }

        Ok(registered)
    }

    /// Catalogue media files that already exist under the watched roots,
    /// oldest modification time first.
    ///
    /// Returns the number of newly registered files.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be updated.
    pub fn catalog_existing(&self) -> Result<usize> {
        let mut found: Vec<(u128, PathBuf)> = Vec::new();

        for root in &self.roots {
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if !entry.file_type().is_file() || !PathFilter::is_media_file(entry.path()) {
                    continue;
                }

                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_millis());
                found.push((mtime, entry.into_path()));
            }
        }

        found.sort();

        let mut registered = 0;
        for (_, path) in &found {
            if self.register(path)? {
                registered += 1;
            }
        }

        tracing::info!(
            scanned = found.len(),
            registered,
            "Catalogued existing media"
        );
        Ok(registered)
    }

    /// Seed the sweep marker on first run.
    ///
    /// Without `backfill` the marker starts above everything catalogued so
    /// far, so only media added from now on is dispatched. With `backfill`
    /// it starts at zero. Does nothing once a marker exists.
    ///
    /// Returns `true` if the marker was seeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be read or written.
    pub fn seed_marker(&self, store: &SettingsStore, backfill: bool) -> Result<bool> {
        if store.has_marker()? {
            return Ok(false);
        }

        if backfill {
            return store.seed_marker(0);
        }

        // Held so that nothing registered meanwhile lands at or below the marker.
        let mut clock = self.clock.lock();
        let marker = now_millis().max(*clock);
        let seeded = store.seed_marker(marker)?;
        *clock = marker;
        Ok(seeded)
    }

    /// Index rows always hold absolute paths, so a file has one spelling.
    fn register(&self, path: &Path) -> Result<bool> {
        let Some(mime) = PathFilter::detect_mime(path) else {
            return Ok(false);
        };
        let path = absolute_path(path)?;
        let path = path.as_path();

        let mut clock = self.clock.lock();
        let added_at = now_millis().max(*clock + 1);
        let record = MediaRecord::new(path.to_string_lossy(), Some(mime), added_at);

        let inserted = self.db.with_conn(|conn| register_media(conn, &record))?;
        if inserted {
            *clock = added_at;
            tracing::debug!(path = %path.display(), added_at, "Registered media");
        }

        Ok(inserted)
    }
}
