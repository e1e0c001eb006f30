//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Sweeps by outcome (`ok`, `failed`).
pub static SWEEPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lifestream_sweeps_total",
        "Total number of feed sweeps",
        &["outcome"]
    )
    .unwrap()
});

/// Items handed to the dispatch queue.
pub static ITEMS_DISPATCHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lifestream_items_dispatched_total",
        "Total number of items put on the dispatch queue"
    )
    .unwrap()
});

/// Items skipped by reason.
pub static ITEMS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lifestream_items_skipped_total",
        "Total number of swept items that were not dispatched",
        &["reason"]
    )
    .unwrap()
});

/// Current durable marker.
pub static MARKER: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "lifestream_marker_millis",
        "Add-time high-water mark of the last committed sweep"
    )
    .unwrap()
});

/// Pending dispatch queue entries.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "lifestream_queue_depth",
        "Number of items waiting for the capture worker"
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    let _ = &*SWEEPS_TOTAL;
    let _ = &*ITEMS_DISPATCHED;
    let _ = &*ITEMS_SKIPPED;
    let _ = &*MARKER;
    let _ = &*QUEUE_DEPTH;

    tracing::debug!("Prometheus metrics initialized");
}
