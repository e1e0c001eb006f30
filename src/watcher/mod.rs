//! Media watching and sweep dispatch.
//!
//! This module provides:
//! - Directory watching using notify-rs, feeding the media index
//! - The sweep dispatcher that hands new media to the capture queue
//! - Path admission rules (own output, watched roots, exclusions)
//! - Bounded liveness holds around each sweep

mod collaborators;
mod dispatcher;
mod events;
mod feed;
mod filter;
mod handler;
mod indexer;
mod liveness;
mod service;
#[allow(clippy::module_inception)]
mod watcher;

pub use collaborators::{CaptureKick, DispatchQueue, Ledger, MarkerStore, MediaFeed};
pub use dispatcher::{Collaborators, Dispatcher, DispatcherConfig, SweepPhase, SweepReport};
pub use events::{ChangeNotification, EventBatch, MediaEvent};
pub use feed::{identity_of, ChangeFeedReader, FeedSweep, ItemDescriptor, MediaKind};
pub use filter::{Admission, PathFilter, PathFilterBuilder, RejectReason};
pub use handler::{WatcherStats, WatcherStatsSnapshot};
pub use indexer::MediaIndexer;
pub use liveness::{LivenessGuard, LivenessProvider, LivenessStats, WakeLock};
pub use service::{TriggerHandle, WatcherService};
pub use watcher::{MediaWatcher, WatcherConfig};
