//! Stuck-pipeline detection.
//!
//! Each worker stamps a [`PollClock`] whenever a poll returns. The
//! [`Watchdog`] checks the clock periodically; when no poll has returned for
//! longer than the processing limit it logs an error and, if configured,
//! terminates the process so that a supervisor restarts it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::lifecycle::ShutdownSignal;

/// Time of the last completed poll, shared between a worker and its
/// watchdog.
#[derive(Debug, Clone)]
pub struct PollClock {
    last_poll: Arc<Mutex<Instant>>,
}

impl Default for PollClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PollClock {
    /// Creates a clock stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_poll: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Records that a poll returned.
    pub fn touch(&self) {
        *self.last_poll.lock() = Instant::now();
    }

    /// Time since the last poll returned.
    pub fn since_last_poll(&self) -> Duration {
        self.last_poll.lock().elapsed()
    }
}

/// Watches a [`PollClock`] for stalls.
#[derive(Debug, Clone)]
pub struct Watchdog {
    name: String,
    clock: PollClock,
    max_processing: Duration,
    period: Duration,
    exit_on_timeout: bool,
}

impl Watchdog {
    /// Creates a watchdog for the worker called `name`.
    pub fn new(name: impl Into<String>, clock: PollClock, max_processing: Duration, period: Duration) -> Self {
        Self {
            name: name.into(),
            clock,
            max_processing,
            period: period.max(Duration::from_millis(1)),
            exit_on_timeout: false,
        }
    }

    /// Terminates the process with status 1 on a stall.
    #[must_use]
    pub const fn exit_on_timeout(mut self, exit: bool) -> Self {
        self.exit_on_timeout = exit;
        self
    }

    /// Whether the worker has gone too long without polling.
    pub fn is_stalled(&self) -> bool {
        self.clock.since_last_poll() > self.max_processing
    }

    /// Checks the clock every period until `shutdown` fires.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.terminated() => return,
                    _ = ticker.tick() => self.check(),
                }
            }
        })
    }

    fn check(&self) {
        if !self.is_stalled() {
            return;
        }
        let stalled_ms = u64::try_from(self.clock.since_last_poll().as_millis()).unwrap_or(u64::MAX);
        error!(
            worker = %self.name,
            stalled_ms,
            limit_ms = u64::try_from(self.max_processing.as_millis()).unwrap_or(u64::MAX),
            "Worker has not polled within the processing limit"
        );
        if self.exit_on_timeout {
            warn!(worker = %self.name, "Exiting after processing timeout");
            std::process::exit(1);
        }
    }
}
