//! Change feed reader: turns media index rows into sweep candidates.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::collaborators::MediaFeed;
use crate::storage::MediaRecord;
use crate::Result;

/// Coarse media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

impl MediaKind {
    /// Classify a MIME type string.
    #[must_use]
    pub fn from_mime(mime: Option<&str>) -> Self {
        match mime.map(str::to_ascii_lowercase) {
            Some(m) if m.starts_with("image/") => Self::Image,
            Some(m) if m.starts_with("video/") => Self::Video,
            _ => Self::Other,
        }
    }
}

/// One candidate found in a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDescriptor {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub added_at: i64,
}

impl ItemDescriptor {
    /// Stable identity used by the ledger: the file name.
    #[must_use]
    pub fn identity(&self) -> String {
        identity_of(&self.path)
    }
}

/// Ledger identity of a media path.
#[must_use]
pub fn identity_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}

/// Output of one feed read.
#[derive(Debug, Default)]
pub struct FeedSweep {
    /// Readable candidates newer than the marker, in feed order.
    pub items: Vec<ItemDescriptor>,
    /// Highest add-time among all rows returned, readable or not.
    pub max_added_at: Option<i64>,
}

/// Reads the media feed relative to a marker.
pub struct ChangeFeedReader {
    feed: Arc<dyn MediaFeed>,
}

impl ChangeFeedReader {
    /// Create a reader over a feed.
    #[must_use]
    pub fn new(feed: Arc<dyn MediaFeed>) -> Self {
        Self { feed }
    }

    /// Collect every usable entry added after `marker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed cannot be queried.
    pub fn read(&self, marker: i64) -> Result<FeedSweep> {
        let rows = self.feed.query(marker)?;
        let mut sweep = FeedSweep::default();

        for row in rows {
            // Rows should arrive newest first, but the max is taken over all of them.
            sweep.max_added_at = sweep.max_added_at.max(Some(row.added_at));

            if row.added_at <= marker {
                continue;
            }

            if let Some(item) = describe(row) {
                sweep.items.push(item);
            }
        }

        tracing::debug!(
            marker,
            candidates = sweep.items.len(),
            max_added_at = ?sweep.max_added_at,
            "Read change feed"
        );

        Ok(sweep)
    }
}

impl std::fmt::Debug for ChangeFeedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedReader").finish_non_exhaustive()
    }
}

fn describe(row: MediaRecord) -> Option<ItemDescriptor> {
    let path = PathBuf::from(row.path);

    if !is_usable_file(&path) {
        tracing::debug!(path = %path.display(), "Skipping missing or unreadable media");
        return None;
    }

    Some(ItemDescriptor {
        kind: MediaKind::from_mime(row.mime_type.as_deref()),
        path,
        added_at: row.added_at,
    })
}

/// Exists, is a regular file, is non-empty and can be opened for reading.
fn is_usable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };

    metadata.is_file() && metadata.len() > 0 && File::open(path).is_ok()
}
