//! Long-running watcher: filesystem events → media index → sweeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::dispatcher::Dispatcher;
use super::events::ChangeNotification;
use super::indexer::MediaIndexer;
use super::watcher::{MediaWatcher, WatcherConfig};
use crate::{Error, Result};

/// Cheap handle for announcing that the media index may have changed.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<ChangeNotification>,
}

impl TriggerHandle {
    /// Schedule a sweep. If one is already pending this is a no-op, since the
    /// pending sweep will see everything.
    pub fn notify_change(&self, self_change: bool) {
        match self.tx.try_send(ChangeNotification { self_change }) {
            Ok(()) => tracing::debug!(self_change, "Sweep scheduled"),
            Err(TrySendError::Full(_)) => {
                tracing::trace!(self_change, "Sweep already pending, coalescing");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Sweep runner stopped, dropping change notification");
            }
        }
    }
}

/// Owns the background tasks of the watcher.
pub struct WatcherService {
    dispatcher: Arc<Dispatcher>,
    indexer: Arc<MediaIndexer>,
    watcher_config: WatcherConfig,
    cancel: CancellationToken,
    started: AtomicBool,
    trigger_tx: mpsc::Sender<ChangeNotification>,
    trigger_rx: Mutex<Option<mpsc::Receiver<ChangeNotification>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WatcherService {
    /// Create a stopped service.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        indexer: Arc<MediaIndexer>,
        watcher_config: WatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        // Capacity 1: at most one sweep pending behind the running one.
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        Self {
            dispatcher,
            indexer,
            watcher_config,
            cancel,
            started: AtomicBool::new(false),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Handle for scheduling sweeps.
    #[must_use]
    pub fn trigger(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    /// The dispatcher driven by this service.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Whether the background tasks were started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the background tasks unless they already run, then schedule an
    /// initial sweep.
    ///
    /// Returns `true` if this call started them. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a watched directory cannot be watched.
    pub fn ensure_running(&self) -> Result<bool> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::info!("Watcher previously started");
            return Ok(false);
        }

        let watcher = if self.watcher_config.watch_dirs.is_empty() {
            None
        } else {
            match MediaWatcher::new(&self.watcher_config) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    self.started.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        };

        let trigger_rx = self
            .trigger_rx
            .lock()
            .take()
            .ok_or_else(|| Error::internal("sweep runner already consumed its channel"))?;

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(run_sweeps(
            Arc::clone(&self.dispatcher),
            trigger_rx,
            self.cancel.clone(),
        )));

        if let Some(watcher) = watcher {
            tasks.push(tokio::spawn(run_events(
                watcher,
                Arc::clone(&self.indexer),
                self.trigger(),
                self.cancel.clone(),
            )));
        }
        drop(tasks);

        tracing::info!(
            watch_dirs = self.watcher_config.watch_dirs.len(),
            "Watcher started"
        );
        self.trigger().notify_change(false);

        Ok(true)
    }

    /// Cancel the background tasks and wait for them to finish.
    ///
    /// A sweep in progress runs to completion first.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Watcher task failed");
            }
        }

        tracing::info!("Watcher stopped");
    }
}

impl std::fmt::Debug for WatcherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherService")
            .field("watcher_config", &self.watcher_config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

async fn run_sweeps(
    dispatcher: Arc<Dispatcher>,
    mut trigger_rx: mpsc::Receiver<ChangeNotification>,
    cancel: CancellationToken,
) {
    tracing::debug!("Sweep runner started");

    loop {
        let notification = tokio::select! {
            () = cancel.cancelled() => break,
            notification = trigger_rx.recv() => match notification {
                Some(notification) => notification,
                None => break,
            },
        };

        tracing::debug!(self_change = notification.self_change, "Media index changed");

        let dispatcher = Arc::clone(&dispatcher);
        // Sweep failures are logged by the dispatcher; the next trigger retries.
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.sweep()).await {
            tracing::error!(error = %e, "Sweep task panicked");
        }
    }

    tracing::debug!("Sweep runner stopped");
}

async fn run_events(
    mut watcher: MediaWatcher,
    indexer: Arc<MediaIndexer>,
    trigger: TriggerHandle,
    cancel: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            () = cancel.cancelled() => break,
            batch = watcher.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        tracing::debug!(events = batch.len(), "Processing media events");

        let indexer = Arc::clone(&indexer);
        match tokio::task::spawn_blocking(move || indexer.register_batch(&batch)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(registered)) => {
                tracing::debug!(registered, "New media registered");
                trigger.notify_change(false);
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to update media index"),
            Err(e) => tracing::error!(error = %e, "Indexing task panicked"),
        }
    }
}
