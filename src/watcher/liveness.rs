//! Bounded liveness holds (wake-lock equivalent).
//!
//! A hold keeps the host from suspending while a sweep runs. Every hold has a
//! hard expiry, and releasing is release-if-held: a guard whose hold already
//! expired does nothing, so it can never drop a hold taken by a later sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::WatcherError;
use crate::Result;

/// Something that can grant liveness holds.
pub trait LivenessProvider: Send + Sync {
    /// Take a hold that expires after `max_hold` at the latest.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the hold.
    fn acquire(&self, max_hold: Duration) -> Result<LivenessGuard>;
}

#[derive(Debug, Default)]
struct HoldTable {
    next_id: AtomicU64,
    holds: Mutex<HashMap<u64, Instant>>,
    acquired: AtomicU64,
    released: AtomicU64,
    expired: AtomicU64,
}

impl HoldTable {
    fn grant(self: &Arc<Self>, max_hold: Duration) -> Result<LivenessGuard> {
        let expiry = Instant::now().checked_add(max_hold).ok_or_else(|| {
            WatcherError::Liveness(format!("hold of {max_hold:?} is out of range"))
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.holds.lock().insert(id, expiry);
        self.acquired.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(hold = id, ?max_hold, "Acquired liveness hold");

        Ok(LivenessGuard {
            id,
            table: Arc::clone(self),
            done: false,
        })
    }

    fn release_if_held(&self, id: u64) -> bool {
        let expiry = self.holds.lock().remove(&id);
        match expiry {
            Some(expiry) if Instant::now() < expiry => {
                self.released.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(hold = id, "Released liveness hold");
                true
            }
            Some(_) => {
                self.expired.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(hold = id, "Liveness hold expired before release");
                false
            }
            None => false,
        }
    }

    fn is_held(&self, id: u64) -> bool {
        self.holds
            .lock()
            .get(&id)
            .is_some_and(|expiry| Instant::now() < *expiry)
    }

    fn active(&self) -> usize {
        let now = Instant::now();
        self.holds.lock().values().filter(|expiry| now < **expiry).count()
    }
}

/// Snapshot of hold accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessStats {
    pub acquired: u64,
    pub released: u64,
    pub expired: u64,
}

/// In-process wake lock.
///
/// Tracks holds and their expiry; the host integration asks
/// [`WakeLock::is_awake`] whether suspension must be deferred.
#[derive(Debug, Clone, Default)]
pub struct WakeLock {
    table: Arc<HoldTable>,
}

impl WakeLock {
    /// Create a wake lock with no holds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any unexpired hold exists.
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.table.active() > 0
    }

    /// Number of unexpired holds.
    #[must_use]
    pub fn active_holds(&self) -> usize {
        self.table.active()
    }

    /// Hold accounting so far.
    #[must_use]
    pub fn stats(&self) -> LivenessStats {
        LivenessStats {
            acquired: self.table.acquired.load(Ordering::Relaxed),
            released: self.table.released.load(Ordering::Relaxed),
            expired: self.table.expired.load(Ordering::Relaxed),
        }
    }
}

impl LivenessProvider for WakeLock {
    fn acquire(&self, max_hold: Duration) -> Result<LivenessGuard> {
        self.table.grant(max_hold)
    }
}

/// Scoped hold. Released on drop if still held.
#[derive(Debug)]
pub struct LivenessGuard {
    id: u64,
    table: Arc<HoldTable>,
    done: bool,
}

impl LivenessGuard {
    /// Identifier of this hold.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Whether the hold is still in force.
    #[must_use]
    pub fn is_held(&self) -> bool {
        !self.done && self.table.is_held(self.id)
    }

    /// Release the hold if it is still held. Later calls do nothing.
    ///
    /// Returns `true` if this call released the hold.
    pub fn release(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.done = true;
        self.table.release_if_held(self.id)
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.release();
    }
}
