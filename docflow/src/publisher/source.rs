//! Producer-side status observed by the completion wait.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Reports whether the task feeding a publisher is done or has failed.
pub trait SourceStatus: Send + Sync {
    /// Whether the source has stopped producing documents.
    fn is_finished(&self) -> bool;

    /// The failure reported by the source, if any.
    fn failure(&self) -> Option<String>;
}

/// Shared status written by a connector task and read by the publisher.
#[derive(Debug, Default)]
pub struct SourceState {
    finished: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl SourceState {
    /// Creates a status for a source that is still running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the source as done producing.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Records a failure and marks the source as done.
    ///
    /// The first recorded failure wins.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(reason.into());
            }
        }
        self.mark_finished();
    }
}

impl SourceStatus for SourceState {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_implies_finished() {
        let state = SourceState::new();
        assert!(!state.is_finished());
        state.mark_failed("disk gone");
        state.mark_failed("later");
        assert!(state.is_finished());
        assert_eq!(state.failure().as_deref(), Some("disk gone"));
    }
}
