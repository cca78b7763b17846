//! Per-stage counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters for one stage, shared by every worker using the pipeline.
#[derive(Debug, Default)]
pub struct StageMetrics {
    processed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    children: AtomicU64,
    elapsed_micros: AtomicU64,
}

impl StageMetrics {
    pub(crate) fn record_success(&self, elapsed: Duration, children: usize) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.children.fetch_add(children as u64, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub(crate) fn record_error(&self, elapsed: Duration) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn add_elapsed(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy.
    pub fn snapshot(&self, stage: &str) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            stage: stage.to_string(),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            children: self.children.load(Ordering::Relaxed),
            elapsed: Duration::from_micros(self.elapsed_micros.load(Ordering::Relaxed)),
        }
    }
}

/// A copy of one stage's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageMetricsSnapshot {
    /// Stage name.
    pub stage: String,
    /// Documents processed successfully.
    pub processed: u64,
    /// Documents the stage did not apply to.
    pub skipped: u64,
    /// Documents the stage failed on.
    pub errors: u64,
    /// Children emitted.
    pub children: u64,
    /// Total time spent in the stage.
    pub elapsed: Duration,
}

impl StageMetricsSnapshot {
    /// Mean time per processed or failed document.
    pub fn mean_latency(&self) -> Duration {
        let calls = self.processed + self.errors;
        if calls == 0 {
            return Duration::ZERO;
        }
        let micros = u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX) / calls;
        Duration::from_micros(micros)
    }
}
