//! Downstream side of the dispatch queue.
//!
//! [`CaptureSignal`] is the kick the dispatcher sends after queueing work.
//! [`CaptureWorker`] drains the queue oldest first and records every item in
//! the processed-item ledger. Image work itself happens elsewhere.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::observability::spans;
use crate::storage::{
    count_pending, get_processed, mark_processed, peek_next, remove_entry, Database,
    ProcessedItem,
};
use crate::watcher::{identity_of, CaptureKick, PathFilter};
use crate::{metrics, Result};

/// Wake-up signal for the capture worker.
///
/// A kick with nobody waiting is remembered, so the next wait returns at once.
#[derive(Debug, Clone, Default)]
pub struct CaptureSignal {
    notify: Arc<Notify>,
}

impl CaptureSignal {
    /// Create a signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next kick.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl CaptureKick for CaptureSignal {
    fn kick(&self) {
        tracing::debug!("Kicking capture worker");
        self.notify.notify_one();
    }
}

/// Drains the dispatch queue into the ledger.
#[derive(Debug)]
pub struct CaptureWorker {
    db: Database,
    signal: CaptureSignal,
    filter: PathFilter,
}

impl CaptureWorker {
    /// Create a worker.
    #[must_use]
    pub const fn new(db: Database, signal: CaptureSignal, filter: PathFilter) -> Self {
        Self { db, signal, filter }
    }

    /// Process everything currently queued.
    ///
    /// Each entry is recorded in the ledger and removed from the queue in a
    /// single transaction, so an item is always either pending or processed.
    ///
    /// Returns the number of entries handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue or the ledger cannot be updated.
    pub fn drain(&self) -> Result<usize> {
        let span = spans::db_span("drain", "dispatch_queue");
        let _entered = span.enter();
        let mut handled = 0;

        while let Some(entry) = self.db.with_conn(peek_next)? {
            let span = spans::capture_span(&entry.path);
            let _item = span.enter();

            let path = Path::new(&entry.path);
            let item = ProcessedItem::new(identity_of(path), entry.path.as_str());
            let sidecars = self.filter.sidecars(path);

            let recorded = self.db.with_transaction(|conn| {
                let recorded = mark_processed(conn, &item)?;
                remove_entry(conn, entry.id)?;
                Ok(recorded)
            })?;

            if recorded {
                tracing::info!(
                    identity = %item.identity,
                    sidecars = sidecars.len(),
                    "Captured item"
                );
            } else {
                let previous = self
                    .db
                    .with_conn(|conn| get_processed(conn, &item.identity))?
                    .map(|earlier| earlier.path);
                tracing::debug!(
                    identity = %item.identity,
                    previous = previous.as_deref().unwrap_or("unknown"),
                    "Item was already in the ledger"
                );
            }
            handled += 1;
        }

        let depth = self.db.with_conn(count_pending)?;
        metrics::QUEUE_DEPTH.set(depth);

        Ok(handled)
    }

    /// Drain on start and after every kick until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("Capture worker started");

        loop {
            let worker = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || worker.drain()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(handled)) => tracing::debug!(handled, "Drained dispatch queue"),
                Ok(Err(e)) => tracing::error!(error = %e, "Failed to drain dispatch queue"),
                Err(e) => tracing::error!(error = %e, "Capture task panicked"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.signal.notified() => {}
            }
        }

        tracing::info!("Capture worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{enqueue_path, have_processed, list_pending, migrate};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();
        db
    }

    fn worker(db: &Database, signal: CaptureSignal) -> CaptureWorker {
        let filter = PathFilter::builder("/data/output")
            .sidecars(["xmp"])
            .build()
            .unwrap();
        CaptureWorker::new(db.clone(), signal, filter)
    }

    #[test]
    fn test_drain_records_and_empties_queue() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("IMG_1.jpg");
        fs::write(&photo, b"jpeg").unwrap();
        fs::write(tmp.path().join("IMG_1.xmp"), b"<xmp/>").unwrap();

        let db = setup_db();
        db.with_conn(|conn| {
            enqueue_path(conn, &photo.to_string_lossy())?;
            enqueue_path(conn, "/dcim/IMG_2.jpg")?;
            Ok(())
        })
        .unwrap();

        let worker = worker(&db, CaptureSignal::new());
        assert_eq!(worker.drain().unwrap(), 2);
        assert_eq!(worker.drain().unwrap(), 0);

        db.with_conn(|conn| {
            assert!(list_pending(conn)?.is_empty());
            assert!(have_processed(conn, "IMG_1.jpg")?);
            assert!(have_processed(conn, "IMG_2.jpg")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_drain_keeps_first_ledger_record() {
        let db = setup_db();
        db.with_conn(|conn| {
            mark_processed(conn, &ProcessedItem::new("IMG_3.jpg", "/old/IMG_3.jpg"))?;
            enqueue_path(conn, "/dcim/IMG_3.jpg")
        })
        .unwrap();

        let worker = worker(&db, CaptureSignal::new());
        assert_eq!(worker.drain().unwrap(), 1);

        db.with_conn(|conn| {
            assert!(list_pending(conn)?.is_empty());
            let kept = get_processed(conn, "IMG_3.jpg")?.unwrap();
            assert_eq!(kept.path, "/old/IMG_3.jpg");
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_kick_before_wait_is_not_lost() {
        let signal = CaptureSignal::new();
        signal.kick();

        tokio::time::timeout(Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_drains_after_kick_and_stops_on_cancel() {
        let db = setup_db();
        let signal = CaptureSignal::new();
        let worker = Arc::new(worker(&db, signal.clone()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&worker).run(cancel.clone()));

        db.with_conn(|conn| enqueue_path(conn, "/dcim/IMG_9.jpg"))
            .unwrap();
        signal.kick();

        let mut processed = false;
        for _ in 0..50 {
            if db
                .with_conn(|conn| have_processed(conn, "IMG_9.jpg"))
                .unwrap()
            {
                processed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(processed);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
