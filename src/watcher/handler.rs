//! Running counters for the watcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Statistics accumulated across sweeps.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub sweeps: AtomicU64,
    pub sweeps_failed: AtomicU64,
    pub items_examined: AtomicU64,
    pub items_dispatched: AtomicU64,
    pub own_files: AtomicU64,
    pub excluded: AtomicU64,
    pub already_processed: AtomicU64,
    pub errors: AtomicU64,
    pub kicks: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweeps_failed: self.sweeps_failed.load(Ordering::Relaxed),
            items_examined: self.items_examined.load(Ordering::Relaxed),
            items_dispatched: self.items_dispatched.load(Ordering::Relaxed),
            own_files: self.own_files.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            already_processed: self.already_processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            kicks: self.kicks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatcherStatsSnapshot {
    pub sweeps: u64,
    pub sweeps_failed: u64,
    pub items_examined: u64,
    pub items_dispatched: u64,
    pub own_files: u64,
    pub excluded: u64,
    pub already_processed: u64,
    pub errors: u64,
    pub kicks: u64,
}
