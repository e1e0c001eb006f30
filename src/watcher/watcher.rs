//! Media directory watcher using notify-rs.

#![allow(clippy::used_underscore_binding)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::{EventBatch, MediaEvent};
use super::filter::PathFilter;
use crate::config::absolute_path;
use crate::error::WatcherError;
use crate::Result;

/// Debounce duration for file events.
const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// Media watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directories to watch.
    pub watch_dirs: Vec<PathBuf>,
    /// Debounce duration.
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            debounce: DEBOUNCE_DURATION,
        }
    }
}

/// Watches media directories and yields debounced batches of media events.
///
/// Non-media files are dropped here. Own output is not: the dispatcher is
/// the one that recognizes and skips it.
pub struct MediaWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    event_rx: mpsc::Receiver<EventBatch>,
    watched_dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl MediaWatcher {
    /// Create a watcher over the configured directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or a directory
    /// cannot be watched.
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let (batch_tx, event_rx) = mpsc::channel(100);
        let watched_dirs = Arc::new(Mutex::new(Vec::new()));
        let dirs = Arc::clone(&watched_dirs);

        let debouncer = new_debouncer(
            config.debounce,
            move |result: notify_debouncer_mini::DebounceEventResult| match result {
                Ok(events) => {
                    let mut batch = EventBatch::new();
                    for event in events {
                        if matches!(event.kind, DebouncedEventKind::Any) {
                            batch.add(MediaEvent::from_path(event.path));
                        }
                    }

                    let watched = dirs.lock().clone();
                    batch.retain(|p| PathFilter::is_media_file(p) && is_under_watched(&watched, p));

                    if !batch.is_empty() && batch_tx.blocking_send(batch).is_err() {
                        tracing::debug!("Media event receiver closed");
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: "init".to_string(),
            reason: e.to_string(),
        })?;

        let mut watcher = Self {
            _debouncer: debouncer,
            event_rx,
            watched_dirs,
        };

        for dir in &config.watch_dirs {
            watcher.watch(dir)?;
        }

        Ok(watcher)
    }

    /// Add a directory to watch. A relative path resolves against the current
    /// directory, matching the absolute paths events arrive with.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = absolute_path(path.as_ref())?;

        if !path.is_dir() {
            return Err(WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        self._debouncer
            .watcher()
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched_dirs.lock().push(path.clone());
        tracing::info!(path = %path.display(), "Watching media directory");

        Ok(())
    }

    /// Stop watching a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = &absolute_path(path.as_ref())?;

        self._debouncer
            .watcher()
            .unwatch(path)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched_dirs.lock().retain(|p| p != path);

        tracing::info!(path = %path.display(), "Stopped watching media directory");
        Ok(())
    }

    /// Receive the next batch of events.
    ///
    /// Returns `None` if the watcher has been dropped.
    pub async fn recv(&mut self) -> Option<EventBatch> {
        self.event_rx.recv().await
    }

    /// Get list of watched directories.
    #[must_use]
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched_dirs.lock().clone()
    }
}

impl std::fmt::Debug for MediaWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaWatcher")
            .field("watched_dirs", &self.watched_dirs())
            .finish_non_exhaustive()
    }
}

fn is_under_watched(watched: &[PathBuf], path: &Path) -> bool {
    watched.iter().any(|dir| path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert!(config.watch_dirs.is_empty());
        assert_eq!(config.debounce, DEBOUNCE_DURATION);
    }

    #[test]
    fn test_is_under_watched() {
        let watched = vec![PathBuf::from("/sdcard/DCIM"), PathBuf::from("/sdcard/Pictures")];

        assert!(is_under_watched(&watched, Path::new("/sdcard/DCIM/Camera/IMG_1.jpg")));
        assert!(is_under_watched(&watched, Path::new("/sdcard/Pictures/a.png")));
        assert!(!is_under_watched(&watched, Path::new("/sdcard/DCIM2/IMG_1.jpg")));
    }

    #[test]
    fn test_watch_rejects_missing_dir() {
        let mut watcher = MediaWatcher::new(&WatcherConfig::default()).unwrap();
        assert!(watcher.watch("/nonexistent/media").is_err());
    }

    #[test]
    fn test_watch_and_unwatch() {
        let tmp = TempDir::new().unwrap();
        let mut watcher = MediaWatcher::new(&WatcherConfig::default()).unwrap();

        watcher.watch(tmp.path()).unwrap();
        assert_eq!(watcher.watched_dirs(), vec![tmp.path().to_path_buf()]);

        watcher.unwatch(tmp.path()).unwrap();
        assert!(watcher.watched_dirs().is_empty());
    }

    #[tokio::test]
    async fn test_new_media_file_reported() {
        let tmp = TempDir::new().unwrap();
        let config = WatcherConfig {
            watch_dirs: vec![tmp.path().to_path_buf()],
            debounce: Duration::from_millis(50),
        };
        let mut watcher = MediaWatcher::new(&config).unwrap();

        std::fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::write(tmp.path().join("IMG_1.jpg"), b"jpeg").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(batch
            .appeared
            .iter()
            .all(|p| p.extension().is_some_and(|e| e == "jpg")));
    }

    #[tokio::test]
    async fn test_relative_watch_dir_reports_events() {
        let tmp = tempfile::Builder::new().tempdir_in(".").unwrap();
        let cwd = std::env::current_dir().unwrap();
        let relative = tmp
            .path()
            .strip_prefix(&cwd)
            .unwrap_or(tmp.path())
            .to_path_buf();
        assert!(relative.is_relative());

        let config = WatcherConfig {
            watch_dirs: vec![relative.clone()],
            debounce: Duration::from_millis(50),
        };
        let mut watcher = MediaWatcher::new(&config).unwrap();
        assert!(watcher.watched_dirs().iter().all(|dir| dir.is_absolute()));

        std::fs::write(relative.join("IMG_1.jpg"), b"jpeg").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(batch
            .appeared
            .iter()
            .any(|p| p.ends_with("IMG_1.jpg") && p.is_absolute()));
    }
}
