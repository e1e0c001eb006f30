//! Media file events and change notifications.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

/// A change to a media path seen by the filesystem watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The file exists now (created, modified or moved in).
    Appeared(PathBuf),
    /// The file is gone.
    Vanished(PathBuf),
}

impl MediaEvent {
    /// Classify a debounced path by whether it still exists.
    #[must_use]
    pub fn from_path(path: PathBuf) -> Self {
        if path.exists() {
            Self::Appeared(path)
        } else {
            Self::Vanished(path)
        }
    }

    /// Path the event refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Appeared(p) | Self::Vanished(p) => p,
        }
    }
}

/// Debounced batch of media events.
#[derive(Debug, Default)]
pub struct EventBatch {
    /// Files to register in the media index.
    pub appeared: Vec<PathBuf>,
    /// Files to drop from the media index.
    pub vanished: Vec<PathBuf>,
}

impl EventBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event. The latest event for a path wins.
    pub fn add(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Appeared(path) => {
                self.vanished.retain(|p| p != &path);
                if !self.appeared.contains(&path) {
                    self.appeared.push(path);
                }
            }
            MediaEvent::Vanished(path) => {
                self.appeared.retain(|p| p != &path);
                if !self.vanished.contains(&path) {
                    self.vanished.push(path);
                }
            }
        }
    }

    /// Keep only paths accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.appeared.retain(|p| keep(p));
        self.vanished.retain(|p| keep(p));
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.vanished.is_empty()
    }

    /// Get total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.appeared.len() + self.vanished.len()
    }
}

/// "The media index may have changed."
///
/// Carries no payload beyond where it came from; the sweep re-reads the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    /// Raised by our own writes rather than an external change.
    pub self_change: bool,
}
