//! Observer trait for task lifecycle events.
//!
//! Inject an [`Arc<dyn TaskObserver>`] into
//! [`crate::TaskOrchestrator::with_observer`] to receive events as the task
//! moves through its phases. The orchestrator calls observers after releasing
//! its state lock, so an observer may read [`crate::TaskOrchestrator::snapshot`]
//! from inside a callback.
//!
//! For pull-style consumers, [`crate::TaskOrchestrator::snapshots`] offers the
//! same information as a stream of whole snapshots.
//!
//! # Example
//!
//! ```rust
//! use pdf2md_remote::{Phase, TaskObserver};
//! use std::sync::{Arc, Mutex};
//!
//! struct PhaseLog(Mutex<Vec<Phase>>);
//!
//! impl TaskObserver for PhaseLog {
//!     fn on_phase_change(&self, _from: Phase, to: Phase) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//!
//! let log: Arc<dyn TaskObserver> = Arc::new(PhaseLog(Mutex::new(Vec::new())));
//! ```

use crate::orchestrator::{ConversionResult, Phase};
use std::sync::Arc;
use std::time::Duration;

/// Receives task events. All methods default to no-ops.
///
/// Callbacks run on whichever task produced the event (a timer task or the
/// caller of an orchestrator method), so they must be cheap and must not
/// block.
pub trait TaskObserver: Send + Sync {
    /// The task moved from `from` to `to`.
    fn on_phase_change(&self, from: Phase, to: Phase) {
        let _ = (from, to);
    }

    /// Service-reported progress increased to `percent`.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// The elapsed-time clock ticked.
    fn on_tick(&self, elapsed: Duration) {
        let _ = elapsed;
    }

    /// A user-visible message was raised.
    fn on_notice(&self, message: &str) {
        let _ = message;
    }

    /// The result of a completed task was fetched.
    fn on_result(&self, result: &ConversionResult) {
        let _ = result;
    }
}

/// Observer that ignores everything. The default.
pub struct NoopObserver;

impl TaskObserver for NoopObserver {}

/// The observer type the orchestrator stores.
pub type SharedObserver = Arc<dyn TaskObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        phases: AtomicUsize,
        ticks: AtomicUsize,
    }

    impl TaskObserver for CountingObserver {
        fn on_phase_change(&self, _from: Phase, _to: Phase) {
            self.phases.fetch_add(1, Ordering::SeqCst);
        }

        fn on_tick(&self, _elapsed: Duration) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn defaults_are_noops() {
        let o: SharedObserver = Arc::new(NoopObserver);
        o.on_phase_change(Phase::Idle, Phase::FileSelected);
        o.on_progress(50);
        o.on_notice("hello");
    }

    #[test]
    fn overridden_methods_are_called() {
        let o = Arc::new(CountingObserver {
            phases: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
        });
        let shared: SharedObserver = o.clone();
        shared.on_phase_change(Phase::Uploading, Phase::Uploaded);
        shared.on_tick(Duration::from_secs(1));
        shared.on_tick(Duration::from_secs(2));
        shared.on_progress(10);
        assert_eq!(o.phases.load(Ordering::SeqCst), 1);
        assert_eq!(o.ticks.load(Ordering::SeqCst), 2);
    }
}
