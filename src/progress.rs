//! Progress-callback trait for per-file backfill events.
//!
//! Inject an [`Arc<dyn BackfillProgressCallback>`] via
//! [`crate::config::FallbackConfigBuilder::progress_callback`] to receive
//! events as [`crate::backfill`] works through its sources.
//!
//! # Example
//!
//! ```rust
//! use svg2png::{BackfillProgressCallback, ConversionOutcome, FallbackConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BackfillProgressCallback for CountingCallback {
//!     fn on_source_complete(&self, source: &Path, _outcome: &ConversionOutcome) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {}", source.display());
//!     }
//! }
//!
//! let config = FallbackConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ConversionOutcome;
use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::backfill`] as it processes each source.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// per-source methods may be called from several tasks at once. All methods
/// default to no-ops.
pub trait BackfillProgressCallback: Send + Sync {
    /// Called once before the first source is attempted.
    fn on_backfill_start(&self, total_sources: usize) {
        let _ = total_sources;
    }

    /// Called just before a source is handed to the conversion gate.
    fn on_source_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called with the outcome of each source.
    fn on_source_complete(&self, source: &Path, outcome: &ConversionOutcome) {
        let _ = (source, outcome);
    }

    /// Called once after every source has been attempted.
    fn on_backfill_complete(&self, created: usize, skipped: usize, failed: usize) {
        let _ = (created, skipped, failed);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl BackfillProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FallbackConfig`].
pub type ProgressCallback = Arc<dyn BackfillProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SkipReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        failed_total: AtomicUsize,
    }

    impl BackfillProgressCallback for TrackingCallback {
        fn on_source_start(&self, _source: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_source_complete(&self, _source: &Path, _outcome: &ConversionOutcome) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_backfill_complete(&self, _created: usize, _skipped: usize, failed: usize) {
            self.failed_total.store(failed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_backfill_start(2);
        cb.on_source_start(Path::new("a.svg"));
        cb.on_source_complete(
            Path::new("a.svg"),
            &ConversionOutcome::Skipped(SkipReason::MissingCredentials),
        );
        cb.on_backfill_complete(0, 1, 0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let skipped = ConversionOutcome::Skipped(SkipReason::OutputAlreadyExists);

        tracker.on_source_start(Path::new("a.svg"));
        tracker.on_source_complete(Path::new("a.svg"), &skipped);
        tracker.on_source_start(Path::new("b.svg"));
        tracker.on_source_complete(Path::new("b.svg"), &skipped);
        tracker.on_backfill_complete(0, 2, 0);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failed_total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_backfill_start(10);
    }
}
