//! In-process broker.
//!
//! Topics are split into partitions chosen by key hash. Each consumer group
//! keeps a read position and a committed offset per partition, so a group
//! sees every record once unless a consumer rewinds.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{QueueConsumer, QueueMessage, QueuePosition, QueueProducer};
use crate::errors::QueueError;

/// Partitions per topic unless configured otherwise.
pub const DEFAULT_PARTITIONS: u32 = 4;

/// A shared in-memory broker. Clones refer to the same topics.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Debug)]
struct BrokerInner {
    partitions: u32,
    state: Mutex<BrokerState>,
    arrivals: Notify,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<QueueMessage>>>,
    cursors: HashMap<(String, String), GroupCursor>,
}

#[derive(Debug)]
struct GroupCursor {
    committed: Vec<u64>,
    position: Vec<u64>,
}

impl GroupCursor {
    fn new(partitions: u32) -> Self {
        Self {
            committed: vec![0; partitions as usize],
            position: vec![0; partitions as usize],
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

impl MemoryBroker {
    /// Creates a broker whose topics have `partitions` partitions.
    #[must_use]
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                state: Mutex::new(BrokerState::default()),
                arrivals: Notify::new(),
            }),
        }
    }

    /// Creates a consumer for `topic` in consumer group `group`.
    #[must_use]
    pub fn consumer(&self, group: impl Into<String>, topic: impl Into<String>) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            group: group.into(),
            topic: topic.into(),
            in_flight: Vec::new(),
            next_partition: 0,
        }
    }

    fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let partitions = u64::from(self.inner.partitions);
        u32::try_from(hasher.finish() % partitions).unwrap_or(0)
    }

    /// Returns every record of a topic, partition by partition.
    pub fn messages(&self, topic: &str) -> Vec<QueueMessage> {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records committed by a group on a topic.
    pub fn committed(&self, group: &str, topic: &str) -> u64 {
        self.inner
            .state
            .lock()
            .cursors
            .get(&(group.to_string(), topic.to_string()))
            .map_or(0, |cursor| cursor.committed.iter().sum())
    }
}

#[async_trait]
impl QueueProducer for MemoryBroker {
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<(), QueueError> {
        let partition = self.partition_for(key);
        {
            let mut state = self.inner.state.lock();
            let partitions = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| vec![Vec::new(); self.inner.partitions as usize]);
            let log = &mut partitions[partition as usize];
            log.push(QueueMessage {
                topic: topic.to_string(),
                partition,
                offset: log.len() as u64,
                key: key.to_string(),
                value,
            });
        }
        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    async fn flush(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// A consumer bound to one topic and consumer group.
#[derive(Debug)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    group: String,
    topic: String,
    in_flight: Vec<(u32, u64)>,
    next_partition: u32,
}

impl MemoryConsumer {
    fn try_take(&mut self) -> Option<QueueMessage> {
        let partitions = self.broker.inner.partitions;
        let mut state = self.broker.inner.state.lock();
        let BrokerState { topics, cursors } = &mut *state;
        let logs = topics.get(&self.topic)?;
        let cursor = cursors
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert_with(|| GroupCursor::new(partitions));

        for step in 0..partitions {
            let partition = (self.next_partition + step) % partitions;
            let index = partition as usize;
            let position = cursor.position[index];
            if let Some(message) = logs[index].get(position as usize) {
                cursor.position[index] = position + 1;
                self.next_partition = (partition + 1) % partitions;
                self.in_flight.push((partition, position));
                return Some(message.clone());
            }
        }
        None
    }

    /// Returns the topic this consumer reads.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl QueueConsumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<QueueMessage>, QueueError> {
        let deadline = Instant::now() + timeout;
        let broker = self.broker.clone();
        loop {
            let notified = broker.inner.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take() {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&mut self) -> Result<(), QueueError> {
        let partitions = self.broker.inner.partitions;
        let mut state = self.broker.inner.state.lock();
        let cursor = state
            .cursors
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert_with(|| GroupCursor::new(partitions));
        for (partition, offset) in self.in_flight.drain(..) {
            let committed = &mut cursor.committed[partition as usize];
            *committed = (*committed).max(offset + 1);
        }
        Ok(())
    }

    async fn commit_positions(&mut self, positions: &[QueuePosition]) -> Result<(), QueueError> {
        let partitions = self.broker.inner.partitions;
        let mut state = self.broker.inner.state.lock();
        let cursor = state
            .cursors
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert_with(|| GroupCursor::new(partitions));
        for position in positions {
            let committed = cursor
                .committed
                .get_mut(position.partition as usize)
                .ok_or_else(|| QueueError::Commit(format!("no partition {}", position.partition)))?;
            *committed = (*committed).max(position.offset + 1);
        }
        self.in_flight.retain(|&(partition, offset)| {
            !positions
                .iter()
                .any(|p| p.partition == partition && p.offset >= offset)
        });
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), QueueError> {
        let partitions = self.broker.inner.partitions;
        let mut state = self.broker.inner.state.lock();
        let cursor = state
            .cursors
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert_with(|| GroupCursor::new(partitions));
        for (partition, offset) in self.in_flight.drain(..) {
            let position = &mut cursor.position[partition as usize];
            *position = (*position).min(offset);
        }
        Ok(())
    }

    async fn lag(&self) -> Result<u64, QueueError> {
        let state = self.broker.inner.state.lock();
        let Some(logs) = state.topics.get(&self.topic) else {
            return Ok(0);
        };
        let cursor = state.cursors.get(&(self.group.clone(), self.topic.clone()));
        Ok(logs
            .iter()
            .enumerate()
            .map(|(index, log)| {
                let position = cursor.map_or(0, |c| c.position[index]);
                (log.len() as u64).saturating_sub(position)
            })
            .sum())
    }
}
