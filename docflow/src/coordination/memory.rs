//! In-memory counter store for local runs and tests.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{RetryCounterStore, VersionedCount};
use crate::errors::CoordinationError;

/// A counter store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, VersionedCount>,
}

impl InMemoryCounterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counters exist.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl RetryCounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<VersionedCount, CoordinationError> {
        Ok(self.counters.get(key).map(|c| *c).unwrap_or_default())
    }

    async fn try_set(&self, key: &str, expected_version: u64, value: u64) -> Result<bool, CoordinationError> {
        match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                if current.version != expected_version {
                    return Ok(false);
                }
                current.value = value;
                current.version += 1;
                Ok(true)
            }
            Entry::Vacant(entry) => {
                if expected_version != 0 {
                    return Ok(false);
                }
                entry.insert(VersionedCount { value, version: 1 });
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.counters.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_counter_reads_zero() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.get("k").await.unwrap(), VersionedCount::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = InMemoryCounterStore::new();
        assert!(store.try_set("k", 0, 1).await.unwrap());
        assert!(!store.try_set("k", 0, 5).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), VersionedCount { value: 1, version: 1 });
    }

    #[tokio::test]
    async fn test_delete_resets() {
        let store = InMemoryCounterStore::new();
        store.increment("k").await.unwrap();
        store.increment("k").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.increment("k").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryCounterStore::new());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        store.increment("shared").await.unwrap();
                    }
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }
        assert_eq!(store.get("shared").await.unwrap().value, 200);
    }
}
