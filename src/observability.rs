//! Structured logging and tracing configuration.
//!
//! Log output is plain text by default or JSON when requested. The level comes
//! from `RUST_LOG` if set, otherwise from the `--log-level` flag.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Span constructors shared across the crate.
pub mod spans {
    use tracing::{info_span, Span};
    use uuid::Uuid;

    /// Span for one sweep.
    #[must_use]
    pub fn sweep_span(sweep_id: Uuid) -> Span {
        info_span!("sweep", id = %sweep_id)
    }

    /// Span for one item handled by the capture worker.
    #[must_use]
    pub fn capture_span(path: &str) -> Span {
        info_span!("capture", path = %path)
    }

    /// Span for a database operation.
    #[must_use]
    pub fn db_span(operation: &str, table: &str) -> Span {
        info_span!(
            "db_operation",
            operation = %operation,
            table = %table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_enter() {
        let span = spans::sweep_span(uuid::Uuid::nil());
        let _sweep = span.enter();

        let span = spans::capture_span("/dcim/IMG_1.jpg");
        let _capture = span.enter();

        let span = spans::db_span("upsert", "settings");
        let _db = span.enter();
    }
}
