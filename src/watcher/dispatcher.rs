//! Sweep orchestration: feed → filters → queue → marker → kick.
//!
//! One sweep runs at a time per dispatcher. The liveness hold is taken before
//! the sweep lock and released on every exit path, including unwinding.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use uuid::Uuid;

use super::collaborators::{CaptureKick, DispatchQueue, Ledger, MarkerStore, MediaFeed};
use super::feed::{ChangeFeedReader, ItemDescriptor};
use super::filter::{Admission, PathFilter, RejectReason};
use super::handler::WatcherStats;
use super::liveness::LivenessProvider;
use crate::config::DEFAULT_WAKE_TIMEOUT;
use crate::error::WatcherError;
use crate::{metrics, Error, Result};

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Upper bound on the liveness hold of one sweep.
    pub max_hold: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_hold: DEFAULT_WAKE_TIMEOUT,
        }
    }
}

/// Everything a dispatcher talks to.
pub struct Collaborators {
    pub feed: Arc<dyn MediaFeed>,
    pub ledger: Arc<dyn Ledger>,
    pub queue: Arc<dyn DispatchQueue>,
    pub markers: Arc<dyn MarkerStore>,
    pub kick: Arc<dyn CaptureKick>,
    pub liveness: Arc<dyn LivenessProvider>,
}

/// Where a sweep currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    AcquiringLiveness,
    ReadingFeed,
    Filtering,
    AdvancingMarker,
    Dispatching,
    ReleasingLiveness,
}

/// Outcome of a completed sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub marker_before: i64,
    pub marker_after: i64,
    pub examined: usize,
    pub dispatched: usize,
    pub own_files: usize,
    pub excluded: usize,
    pub already_processed: usize,
    pub enqueue_failures: usize,
    pub kicked: bool,
}

impl SweepReport {
    fn new(sweep_id: Uuid, marker_before: i64) -> Self {
        Self {
            sweep_id,
            marker_before,
            marker_after: marker_before,
            examined: 0,
            dispatched: 0,
            own_files: 0,
            excluded: 0,
            already_processed: 0,
            enqueue_failures: 0,
            kicked: false,
        }
    }
}

/// The watcher's sweep engine.
pub struct Dispatcher {
    config: DispatcherConfig,
    reader: ChangeFeedReader,
    filter: PathFilter,
    ledger: Arc<dyn Ledger>,
    queue: Arc<dyn DispatchQueue>,
    markers: Arc<dyn MarkerStore>,
    kick: Arc<dyn CaptureKick>,
    liveness: Arc<dyn LivenessProvider>,
    stats: Arc<WatcherStats>,
    sweep_lock: Mutex<()>,
    phase: Mutex<SweepPhase>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        config: DispatcherConfig,
        filter: PathFilter,
        collaborators: Collaborators,
        stats: Arc<WatcherStats>,
    ) -> Self {
        Self {
            config,
            reader: ChangeFeedReader::new(collaborators.feed),
            filter,
            ledger: collaborators.ledger,
            queue: collaborators.queue,
            markers: collaborators.markers,
            kick: collaborators.kick,
            liveness: collaborators.liveness,
            stats,
            sweep_lock: Mutex::new(()),
            phase: Mutex::new(SweepPhase::Idle),
        }
    }

    /// Phase of the sweep holding the sweep lock (`Idle` when none does).
    #[must_use]
    pub fn phase(&self) -> SweepPhase {
        *self.phase.lock()
    }

    /// Shared statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Record the phase of the sweep holding `_exclusive`.
    fn enter(&self, _exclusive: &MutexGuard<'_, ()>, phase: SweepPhase) {
        *self.phase.lock() = phase;
        tracing::trace!(?phase, "Sweep phase");
    }

    /// Run one full sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed or the marker store fails. Per-item
    /// failures never abort the sweep.
    pub fn sweep(&self) -> Result<SweepReport> {
        let sweep_id = Uuid::new_v4();
        let span = crate::observability::spans::sweep_span(sweep_id);
        let _entered = span.enter();

        // Not stored: a sweep waiting for the lock must not overwrite the
        // phase of the one running.
        tracing::trace!(phase = ?SweepPhase::AcquiringLiveness, "Sweep phase");
        let mut hold = match self.liveness.acquire(self.config.max_hold) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Sweeping without a liveness hold");
                None
            }
        };

        let result = {
            let exclusive = self.sweep_lock.lock();
            let result = self.sweep_locked(&exclusive, sweep_id);

            self.enter(&exclusive, SweepPhase::ReleasingLiveness);
            if let Some(guard) = hold.as_mut() {
                guard.release();
            }
            drop(hold);

            self.enter(&exclusive, SweepPhase::Idle);
            result
        };

        WatcherStats::bump(&self.stats.sweeps);
        match &result {
            Ok(report) => {
                metrics::SWEEPS_TOTAL.with_label_values(&["ok"]).inc();
                tracing::info!(
                    examined = report.examined,
                    dispatched = report.dispatched,
                    marker = report.marker_after,
                    "Sweep complete"
                );
            }
            Err(e) => {
                WatcherStats::bump(&self.stats.sweeps_failed);
                metrics::SWEEPS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::error!(error = %e, "Sweep failed");
            }
        }

        result
    }

    fn sweep_locked(
        &self,
        exclusive: &MutexGuard<'_, ()>,
        sweep_id: Uuid,
    ) -> Result<SweepReport> {
        self.enter(exclusive, SweepPhase::ReadingFeed);
        let marker_before = self.markers.get_marker()?;
        let feed = self.reader.read(marker_before)?;

        self.enter(exclusive, SweepPhase::Filtering);
        let mut report = SweepReport::new(sweep_id, marker_before);
        let mut earliest_failure: Option<i64> = None;

        for item in &feed.items {
            report.examined += 1;
            WatcherStats::bump(&self.stats.items_examined);

            if !self.should_dispatch(item, &mut report) {
                continue;
            }

            let path = item.path.to_string_lossy();
            match self.queue.enqueue(&path) {
                Ok(()) => {
                    report.dispatched += 1;
                    WatcherStats::bump(&self.stats.items_dispatched);
                    metrics::ITEMS_DISPATCHED.inc();
                    tracing::info!(path = %path, "Added item to the processing queue");
                }
                Err(e) => {
                    report.enqueue_failures += 1;
                    WatcherStats::bump(&self.stats.errors);
                    tracing::warn!(path = %path, error = %e, "Failed to queue item");
                    earliest_failure = Some(
                        earliest_failure.map_or(item.added_at, |t| t.min(item.added_at)),
                    );
                }
            }
        }

        self.enter(exclusive, SweepPhase::AdvancingMarker);
        let mut target = feed.max_added_at.unwrap_or(marker_before);
        if let Some(failed_at) = earliest_failure {
            // Keep the failed item above the marker so the next sweep retries it.
            target = target.min(failed_at - 1);
        }
        let marker_after = target.max(marker_before);

        let persisted = if marker_after > marker_before {
            self.advance_marker(marker_after)
        } else {
            Ok(())
        };

        self.enter(exclusive, SweepPhase::Dispatching);
        if report.dispatched > 0 {
            self.kick.kick();
            report.kicked = true;
            WatcherStats::bump(&self.stats.kicks);
        }

        persisted?;
        report.marker_after = marker_after;
        Ok(report)
    }

    /// Run the filter stages for one item, recording why it was skipped.
    fn should_dispatch(&self, item: &ItemDescriptor, report: &mut SweepReport) -> bool {
        let path = &item.path;

        if self.filter.is_own_output(path) {
            self.skip_own_file(item, report);
            return false;
        }

        match self.filter.admit(path) {
            Admission::Admitted => {}
            Admission::Rejected(RejectReason::OwnOutput) => {
                self.skip_own_file(item, report);
                return false;
            }
            Admission::Rejected(reason) => {
                report.excluded += 1;
                WatcherStats::bump(&self.stats.excluded);
                metrics::ITEMS_SKIPPED.with_label_values(&["excluded"]).inc();
                tracing::info!(path = %path.display(), ?reason, "Ignoring path-excluded file");
                return false;
            }
        }

        match self.ledger.have_processed(&item.identity()) {
            Ok(false) => true,
            Ok(true) => {
                report.already_processed += 1;
                WatcherStats::bump(&self.stats.already_processed);
                metrics::ITEMS_SKIPPED
                    .with_label_values(&["already_processed"])
                    .inc();
                tracing::warn!(
                    path = %path.display(),
                    "Item already in the ledger, skipping; the marker should have excluded it"
                );
                false
            }
            Err(e) => {
                WatcherStats::bump(&self.stats.errors);
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ledger lookup failed, dispatching anyway"
                );
                true
            }
        }
    }

    fn skip_own_file(&self, item: &ItemDescriptor, report: &mut SweepReport) {
        report.own_files += 1;
        WatcherStats::bump(&self.stats.own_files);
        metrics::ITEMS_SKIPPED.with_label_values(&["own_file"]).inc();
        tracing::info!(path = %item.path.display(), "Ignoring own file");
    }

    fn advance_marker(&self, marker: i64) -> Result<()> {
        self.markers.set_marker(marker);
        match self.markers.commit() {
            Ok(()) => {
                metrics::MARKER.set(marker);
                tracing::debug!(marker, "Marker advanced");
                Ok(())
            }
            Err(e @ Error::Watcher(WatcherError::MarkerPersist { .. })) => Err(e),
            Err(e) => Err(WatcherError::MarkerPersist {
                marker,
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
