//! Coordination service boundary.
//!
//! Workers count delivery attempts per message in a shared, versioned
//! counter so that several worker processes agree on how often a message has
//! been tried. Counters start at zero, are incremented atomically with a
//! compare-and-set loop, and are deleted once the message is resolved.

mod memory;
mod retry;

use std::fmt::Debug;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::CoordinationError;
use crate::messaging::QueueMessage;

pub use memory::InMemoryCounterStore;
pub use retry::{with_retry, BackoffPolicy, JitterStrategy, RetryingCounterStore};

/// Compare-and-set attempts before [`RetryCounterStore::increment`] gives up.
pub const MAX_CAS_ATTEMPTS: u32 = 64;

/// A counter value together with the version it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionedCount {
    /// Current value; zero for a counter that does not exist yet.
    pub value: u64,
    /// Version for compare-and-set; zero for a counter that does not exist.
    pub version: u64,
}

/// A store of named, versioned counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetryCounterStore: Send + Sync + Debug {
    /// Reads a counter. Missing counters read as zero at version zero.
    async fn get(&self, key: &str) -> Result<VersionedCount, CoordinationError>;

    /// Writes `value` if the counter is still at `expected_version`.
    async fn try_set(&self, key: &str, expected_version: u64, value: u64) -> Result<bool, CoordinationError>;

    /// Deletes a counter. Deleting a missing counter succeeds.
    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;

    /// Atomically increments a counter and returns the new value.
    async fn increment(&self, key: &str) -> Result<u64, CoordinationError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(key).await?;
            let next = current.value + 1;
            if self.try_set(key, current.version, next).await? {
                return Ok(next);
            }
        }
        Err(CoordinationError::Contention {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

/// Builds the counter key of a source message.
///
/// The key is stable across redeliveries of the same record and distinct
/// across groups, topics, partitions and offsets. The record key is hashed
/// so arbitrary keys stay path safe.
pub fn retry_counter_key(group: &str, message: &QueueMessage) -> String {
    let digest = Sha256::digest(message.key.as_bytes());
    let key_hash = hex::encode(&digest[..8]);
    format!(
        "/docflow/counters/{group}/{}/{key_hash}_{}_{}",
        message.topic, message.partition, message.offset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: &str, partition: u32, offset: u64) -> QueueMessage {
        QueueMessage {
            topic: "p_source".to_string(),
            partition,
            offset,
            key: key.to_string(),
            value: Vec::new(),
        }
    }

    #[test]
    fn test_counter_key_is_stable_and_specific() {
        let a = retry_counter_key("g", &message("doc/1", 0, 7));
        assert_eq!(a, retry_counter_key("g", &message("doc/1", 0, 7)));
        assert!(a.starts_with("/docflow/counters/g/p_source/"));
        assert!(a.ends_with("_0_7"));
        assert!(!a.contains("doc/1"));

        assert_ne!(a, retry_counter_key("g2", &message("doc/1", 0, 7)));
        assert_ne!(a, retry_counter_key("g", &message("doc/2", 0, 7)));
        assert_ne!(a, retry_counter_key("g", &message("doc/1", 1, 7)));
        assert_ne!(a, retry_counter_key("g", &message("doc/1", 0, 8)));
    }

    /// Loses the first `losses` compare-and-set races.
    #[derive(Debug)]
    struct ContendedStore {
        inner: InMemoryCounterStore,
        losses: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl RetryCounterStore for ContendedStore {
        async fn get(&self, key: &str) -> Result<VersionedCount, CoordinationError> {
            self.inner.get(key).await
        }

        async fn try_set(&self, key: &str, expected_version: u64, value: u64) -> Result<bool, CoordinationError> {
            use std::sync::atomic::Ordering;
            if self.losses.load(Ordering::SeqCst) > 0 {
                self.losses.fetch_sub(1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.try_set(key, expected_version, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_increment_retries_lost_races() {
        let store = ContendedStore {
            inner: InMemoryCounterStore::new(),
            losses: std::sync::atomic::AtomicU32::new(3),
        };
        assert_eq!(store.increment("k").await.unwrap(), 1);
        assert_eq!(store.increment("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_increment_gives_up_under_constant_contention() {
        let store = ContendedStore {
            inner: InMemoryCounterStore::new(),
            losses: std::sync::atomic::AtomicU32::new(u32::MAX),
        };
        assert_eq!(
            store.increment("k").await,
            Err(CoordinationError::Contention {
                key: "k".to_string(),
                attempts: MAX_CAS_ATTEMPTS
            })
        );
    }
}
