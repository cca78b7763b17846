//! Delivery of processed documents.
//!
//! An [`Indexer`] reads the pipeline's destination topic, accumulates
//! documents in a [`Batch`] and hands each flushed batch to an
//! [`IndexerSink`]. Every document of a delivered batch gets a FINISH event;
//! every document of a failed batch gets a FAIL event carrying the sink
//! error. Only the offsets of a resolved batch are committed, so documents
//! still buffered stay uncommitted until their own batch is resolved.

mod sink;

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::batch::Batch;
use crate::config::IndexerConfig;
use crate::core::{Event, EventType};
use crate::document::Document;
use crate::errors::IndexerError;
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{QueueConsumer, QueuePosition, QueueProducer, TopicNames};

pub use sink::{IndexerSink, LoggingSink};

/// Documents resolved by an indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexerStats {
    /// Documents the sink accepted.
    pub indexed: u64,
    /// Documents in batches the sink rejected.
    pub failed: u64,
}

#[derive(Debug)]
struct Pending {
    document: Document,
    position: QueuePosition,
}

/// Batches documents from a destination topic into a sink.
#[derive(Debug)]
pub struct Indexer {
    name: String,
    topics: TopicNames,
    consumer: Box<dyn QueueConsumer>,
    producer: Arc<dyn QueueProducer>,
    sink: Arc<dyn IndexerSink>,
    batch: Batch<Pending>,
    poll_timeout: Duration,
    ignore_fields: Vec<String>,
    id_override_field: Option<String>,
    stats: IndexerStats,
}

impl Indexer {
    /// Creates an indexer. `consumer` must read `topics.destination`.
    pub fn new(
        name: impl Into<String>,
        topics: TopicNames,
        consumer: Box<dyn QueueConsumer>,
        producer: Arc<dyn QueueProducer>,
        sink: Arc<dyn IndexerSink>,
        config: &IndexerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            consumer,
            producer,
            sink,
            batch: Batch::new(config.batch_size, config.batch_timeout()),
            poll_timeout: config.poll_timeout(),
            ignore_fields: config.ignore_fields.clone(),
            id_override_field: config.id_override_field.clone(),
            stats: IndexerStats::default(),
        }
    }

    /// Returns the counters.
    pub const fn stats(&self) -> IndexerStats {
        self.stats
    }

    /// Polls once and delivers whatever the batch releases. Returns the
    /// number of documents resolved by this call.
    pub async fn poll_once(&mut self) -> Result<usize, IndexerError> {
        let pending = match self.consumer.poll(self.poll_timeout).await? {
            Some(message) => match Document::from_slice(&message.value) {
                Ok(document) if document.run_id().is_some() => Some(Pending {
                    document,
                    position: message.position(),
                }),
                Ok(document) => {
                    warn!(indexer = %self.name, doc_id = %document.id(), "Skipping document without run id");
                    None
                }
                Err(e) => {
                    warn!(indexer = %self.name, offset = message.offset, error = %e, "Skipping malformed document");
                    None
                }
            },
            None => None,
        };

        let flushed = self.batch.add(pending);
        self.deliver(flushed).await
    }

    /// Polls until `shutdown` fires or polling fails, then flushes the
    /// remainder and closes the sink. A polling failure is returned after
    /// the remainder has been handled.
    pub async fn run(&mut self, shutdown: ShutdownSignal) -> Result<(), IndexerError> {
        info!(indexer = %self.name, topic = %self.topics.destination, "Indexer started");
        let mut outcome = Ok(());
        while !shutdown.is_terminated() {
            if let Err(e) = self.poll_once().await {
                error!(indexer = %self.name, error = %e, "Indexer loop failed");
                outcome = Err(e);
                break;
            }
        }

        let remainder = self.batch.flush();
        let delivered = self.deliver(remainder).await;
        let closed = self.sink.close().await;
        info!(indexer = %self.name, indexed = self.stats.indexed, failed = self.stats.failed, "Indexer stopped");

        outcome?;
        delivered?;
        closed?;
        Ok(())
    }

    /// Applies the ignored fields and the id override to the documents the
    /// sink sees. Events keep using the original ids.
    fn prepare<'a>(&self, documents: &'a [Document]) -> Cow<'a, [Document]> {
        if self.ignore_fields.is_empty() && self.id_override_field.is_none() {
            return Cow::Borrowed(documents);
        }
        let prepared = documents
            .iter()
            .map(|document| {
                let override_id = self
                    .id_override_field
                    .as_deref()
                    .and_then(|field| document.get_string(field));
                let mut prepared = match override_id.map(|id| document.clone_with_new_id(id)) {
                    Some(Ok(renamed)) => renamed,
                    Some(Err(e)) => {
                        warn!(indexer = %self.name, doc_id = %document.id(), error = %e, "Ignoring id override");
                        document.clone()
                    }
                    None => document.clone(),
                };
                for field in &self.ignore_fields {
                    if let Err(e) = prepared.remove_field(field) {
                        warn!(indexer = %self.name, field = %field, error = %e, "Cannot strip field");
                    }
                }
                prepared
            })
            .collect();
        Cow::Owned(prepared)
    }

    async fn deliver(&mut self, batch: Vec<Pending>) -> Result<usize, IndexerError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let (documents, positions): (Vec<Document>, Vec<QueuePosition>) =
            batch.into_iter().map(|p| (p.document, p.position)).unzip();

        let prepared = self.prepare(&documents);
        let sent = self.sink.send(&prepared).await;
        let (event_type, message) = match sent {
            Ok(()) => {
                debug!(indexer = %self.name, count = documents.len(), "Batch delivered");
                self.stats.indexed += documents.len() as u64;
                (EventType::Finish, None)
            }
            Err(e) => {
                error!(indexer = %self.name, count = documents.len(), error = %e, "Batch delivery failed");
                self.stats.failed += documents.len() as u64;
                (EventType::Fail, Some(e.to_string()))
            }
        };

        for document in &documents {
            let Some(run_id) = document.run_id() else {
                continue;
            };
            let mut event = Event::new(document.id(), run_id, event_type);
            if let Some(message) = &message {
                event = event.with_message(message.as_str());
            }
            self.producer
                .send(&self.topics.events(run_id), document.id(), event.to_bytes()?)
                .await?;
        }
        self.producer.flush().await?;
        self.consumer.commit_positions(&positions).await?;
        Ok(documents.len())
    }
}
