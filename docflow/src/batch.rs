//! Size and time windowed batching.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default batch window.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// A bounded accumulator that releases its contents when full or when the
/// window since the last accepted item has elapsed.
///
/// A batch never blocks and is meant to be driven by a single consumer loop.
/// Callers feed it with [`Batch::add`], passing `None` on idle polls so that
/// an expired window is still flushed.
#[derive(Debug)]
pub struct Batch<T> {
    queue: VecDeque<T>,
    capacity: usize,
    timeout: Duration,
    last_add: Instant,
}

impl<T> Batch<T> {
    /// Creates a new batch. A capacity of zero is treated as one.
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            timeout,
            last_add: Instant::now(),
        }
    }

    /// Offers an item, returning whatever this call flushed.
    ///
    /// An expired window is flushed first, even when `item` is `None`. A full
    /// queue is drained before the new item is queued.
    pub fn add(&mut self, item: Option<T>) -> Vec<T> {
        let mut flushed = if self.is_expired() {
            self.flush()
        } else {
            Vec::new()
        };

        if let Some(item) = item {
            if self.queue.len() >= self.capacity {
                flushed.extend(self.queue.drain(..));
            }
            self.queue.push_back(item);
            self.last_add = Instant::now();
        }
        flushed
    }

    /// Drains everything and restarts the window.
    pub fn flush(&mut self) -> Vec<T> {
        self.last_add = Instant::now();
        self.queue.drain(..).collect()
    }

    /// Drains everything if the window has elapsed.
    pub fn flush_if_expired(&mut self) -> Vec<T> {
        if self.is_expired() {
            self.flush()
        } else {
            Vec::new()
        }
    }

    /// Whether the window since the last accepted item has elapsed.
    pub fn is_expired(&self) -> bool {
        self.last_add.elapsed() > self.timeout
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of queued items.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT)
    }
}
