//! Pipeline worker loop.
//!
//! A [`Worker`] takes one message at a time from the pipeline's source
//! topic, runs it through the pipeline and forwards the results to the
//! destination topic. The source offset is committed only after the results
//! and their events were flushed. With retry tracking enabled, every
//! delivery of a message increments a shared counter; a message delivered
//! more than `max_retries` times is copied to the dead-letter topic and
//! abandoned.

mod pool;
mod watchdog;


use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::coordination::{retry_counter_key, RetryCounterStore};
use crate::core::{Event, EventType};
use crate::document::Document;
use crate::errors::WorkerError;
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{QueueConsumer, QueueMessage, QueueProducer, TopicNames};
use crate::pipeline::{Pipeline, PipelineResult};

pub use pool::WorkerPool;
pub use watchdog::{PollClock, Watchdog};

/// Event message attached to a FAIL event for a dead-lettered document.
pub const SENT_TO_DLQ: &str = "SENT_TO_DLQ";

/// What one iteration of the loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// No message arrived within the poll timeout.
    Idle,
    /// The message was processed and its results forwarded.
    Completed {
        /// Documents sent to the destination topic.
        forwarded: usize,
        /// Documents dropped by a stage.
        dropped: usize,
    },
    /// The message exhausted its retries and was abandoned.
    DeadLettered,
    /// Processing failed.
    Failed {
        /// Why processing failed.
        reason: String,
        /// Whether the message will be delivered again.
        redelivered: bool,
    },
}

/// A processing failure of a single message.
struct Rejection {
    document: Option<Document>,
    reason: String,
}

/// Consumes a source topic on behalf of one pipeline.
#[derive(Debug)]
pub struct Worker {
    name: String,
    pipeline: Arc<Pipeline>,
    topics: TopicNames,
    consumer: Box<dyn QueueConsumer>,
    producer: Arc<dyn QueueProducer>,
    counters: Option<Arc<dyn RetryCounterStore>>,
    config: WorkerConfig,
    clock: PollClock,
}

impl Worker {
    /// Creates a worker. `consumer` must read `topics.source`.
    pub fn new(
        name: impl Into<String>,
        pipeline: Arc<Pipeline>,
        topics: TopicNames,
        consumer: Box<dyn QueueConsumer>,
        producer: Arc<dyn QueueProducer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline,
            topics,
            consumer,
            producer,
            counters: None,
            config,
            clock: PollClock::new(),
        }
    }

    /// Sets the store holding per-message delivery counters.
    #[must_use]
    pub fn with_counter_store(mut self, counters: Arc<dyn RetryCounterStore>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Returns the worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the clock stamped on every poll.
    pub fn clock(&self) -> PollClock {
        self.clock.clone()
    }

    fn retry_tracking(&self) -> Result<Option<(Arc<dyn RetryCounterStore>, u64)>, WorkerError> {
        match (self.config.max_retries, &self.counters) {
            (None, _) => Ok(None),
            (Some(max), Some(store)) => Ok(Some((Arc::clone(store), max))),
            (Some(_), None) => Err(WorkerError::Config(
                "max_retries is set but no retry counter store is available".to_string(),
            )),
        }
    }

    /// Runs one iteration: polls a single message and resolves it.
    pub async fn process_next(&mut self) -> Result<MessageOutcome, WorkerError> {
        let tracking = self.retry_tracking()?;
        let polled = self.consumer.poll(self.config.poll_timeout()).await;
        self.clock.touch();
        let Some(message) = polled? else {
            return Ok(MessageOutcome::Idle);
        };

        let counter = match tracking {
            Some((store, max_retries)) => {
                let key = retry_counter_key(&self.config.consumer_group, &message);
                let attempts = store.increment(&key).await?;
                if attempts > max_retries {
                    self.dead_letter(&message, attempts).await?;
                    self.consumer.commit().await?;
                    store.delete(&key).await?;
                    return Ok(MessageOutcome::DeadLettered);
                }
                Some((store, key))
            }
            None => None,
        };

        let outcome = match self.process_message(&message).await {
            Ok((input_id, result)) => {
                let outcome = MessageOutcome::Completed {
                    forwarded: result.documents.len(),
                    dropped: result.dropped.len(),
                };
                self.forward(&input_id, result).await?;
                self.consumer.commit().await?;
                outcome
            }
            Err(rejection) if counter.is_some() => {
                warn!(
                    worker = %self.name,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    reason = %rejection.reason,
                    "Processing failed; message will be redelivered"
                );
                self.consumer.rewind().await?;
                return Ok(MessageOutcome::Failed {
                    reason: rejection.reason,
                    redelivered: true,
                });
            }
            Err(rejection) => {
                error!(
                    worker = %self.name,
                    topic = %message.topic,
                    offset = message.offset,
                    reason = %rejection.reason,
                    "Processing failed"
                );
                if let Some(document) = &rejection.document {
                    self.emit(document, EventType::Fail, Some(rejection.reason.as_str())).await?;
                    self.producer.flush().await?;
                }
                self.consumer.commit().await?;
                MessageOutcome::Failed {
                    reason: rejection.reason,
                    redelivered: false,
                }
            }
        };

        if let Some((store, key)) = counter {
            store.delete(&key).await?;
        }
        Ok(outcome)
    }

    /// Processes messages until `shutdown` fires or a fatal error occurs.
    pub async fn run(&mut self, shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        self.retry_tracking()?;
        let watchdog = Watchdog::new(
            self.name.clone(),
            self.clock.clone(),
            self.config.max_processing(),
            self.config.watchdog_period(),
        )
        .exit_on_timeout(self.config.exit_on_timeout)
        .spawn(shutdown.clone());

        info!(worker = %self.name, pipeline = %self.pipeline.name(), topic = %self.topics.source, "Worker started");
        let result = loop {
            if shutdown.is_terminated() {
                break Ok(());
            }
            if let Err(e) = self.process_next().await {
                error!(worker = %self.name, error = %e, "Worker stopping");
                break Err(e);
            }
        };
        watchdog.abort();
        info!(worker = %self.name, "Worker stopped");
        result
    }

    async fn process_message(&self, message: &QueueMessage) -> Result<(String, PipelineResult), Rejection> {
        let document = Document::from_slice(&message.value).map_err(|e| Rejection {
            document: None,
            reason: e.to_string(),
        })?;
        let input_id = document.id().to_string();
        debug!(worker = %self.name, doc_id = %input_id, offset = message.offset, "Processing document");

        match self.pipeline.process(document.clone()).await {
            Ok(result) => Ok((input_id, result)),
            Err(e) => Err(Rejection {
                document: Some(document),
                reason: e.to_string(),
            }),
        }
    }

    /// Sends events for created and dropped documents, then the surviving
    /// documents. Each group is flushed before the next is sent so a
    /// terminal event for the input cannot settle the run before the
    /// creation of its children is known.
    async fn forward(&self, input_id: &str, result: PipelineResult) -> Result<(), WorkerError> {
        let PipelineResult { documents, dropped } = result;

        for document in documents.iter().chain(&dropped) {
            if document.id() != input_id {
                self.emit(document, EventType::Create, None).await?;
            }
        }
        for document in &dropped {
            self.emit(document, EventType::Drop, None).await?;
        }
        self.producer.flush().await?;

        for document in &documents {
            self.producer
                .send(&self.topics.destination, document.id(), document.to_bytes())
                .await?;
        }
        self.producer.flush().await?;
        Ok(())
    }

    async fn dead_letter(&self, message: &QueueMessage, attempts: u64) -> Result<(), WorkerError> {
        warn!(
            worker = %self.name,
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            attempts,
            "Retries exhausted; abandoning message"
        );
        if self.config.dead_letter {
            self.producer
                .send(&self.topics.dead_letter, &message.key, message.value.clone())
                .await?;
        }
        if let Ok(document) = Document::from_slice(&message.value) {
            self.emit(&document, EventType::Fail, Some(SENT_TO_DLQ)).await?;
        }
        self.producer.flush().await?;
        Ok(())
    }

    async fn emit(&self, document: &Document, event_type: EventType, message: Option<&str>) -> Result<(), WorkerError> {
        let Some(run_id) = document.run_id() else {
            warn!(doc_id = %document.id(), event = %event_type, "Document has no run id; event not sent");
            return Ok(());
        };
        let mut event = Event::new(document.id(), run_id, event_type);
        if let Some(message) = message {
            event = event.with_message(message);
        }
        self.producer
            .send(&self.topics.events(run_id), document.id(), event.to_bytes()?)
            .await?;
        Ok(())
    }
}
