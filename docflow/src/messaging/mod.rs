//! Queue boundary.
//!
//! Workers, indexers and publishers talk to the broker through the
//! [`QueueConsumer`] and [`QueueProducer`] traits. Messages carry a string key
//! and an opaque byte payload. [`MemoryBroker`] implements both traits in
//! process for local runs and tests.

mod memory;
mod topics;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::QueueError;

pub use memory::{MemoryBroker, MemoryConsumer, DEFAULT_PARTITIONS};
pub use topics::TopicNames;

/// A record read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: u64,
    /// Record key.
    pub key: String,
    /// Record payload.
    pub value: Vec<u8>,
}

impl QueueMessage {
    /// Where the record sits in its topic.
    pub const fn position(&self) -> QueuePosition {
        QueuePosition {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// A record's partition and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueuePosition {
    /// Partition within the topic.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: u64,
}

/// Reads records one at a time on behalf of a consumer group.
#[async_trait]
pub trait QueueConsumer: Send + Sync + Debug {
    /// Waits up to `timeout` for the next record.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError>;

    /// Commits every record returned since the last commit or rewind.
    async fn commit(&mut self) -> Result<(), QueueError>;

    /// Commits up to and including each given position of its partition.
    /// Records polled later stay uncommitted.
    async fn commit_positions(&mut self, positions: &[QueuePosition]) -> Result<(), QueueError>;

    /// Forgets uncommitted records so they are delivered again.
    async fn rewind(&mut self) -> Result<(), QueueError>;

    /// Records still waiting to be polled by this consumer's group.
    async fn lag(&self) -> Result<u64, QueueError>;
}

/// Writes records to topics.
#[async_trait]
pub trait QueueProducer: Send + Sync + Debug {
    /// Sends a record.
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), QueueError>;

    /// Blocks until every sent record is durable.
    async fn flush(&self) -> Result<(), QueueError>;
}
