//! Run-scoped publishing and completion tracking.
//!
//! A [`Publisher`] stamps documents with its run id, sends them to the
//! pipeline's source topic and then reconciles CREATE and terminal events
//! from the run's event topic until every document it knows of has reached a
//! terminal state.
//!
//! Two optional behaviours shape publishing. A pending limit makes `publish`
//! wait until enough documents have settled. Collapsing mode merges
//! consecutive documents that share an id into one, holding the last one
//! back until a different id or [`Publisher::flush`] releases it.

mod source;
mod tracker;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{Event, EventType};
use crate::document::Document;
use crate::errors::PublisherError;
use crate::messaging::{QueueConsumer, QueueProducer, TopicNames};

pub use source::{SourceState, SourceStatus};
pub use tracker::{CompletionTracker, IdMultiset};

/// Default wait on the event topic per poll.
pub const DEFAULT_EVENT_POLL: Duration = Duration::from_millis(50);

/// Default interval between progress log lines.
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// How often a publisher blocked on the pending limit re-checks it without
/// being woken.
const CAPACITY_RECHECK: Duration = Duration::from_secs(10);

/// How a completion wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The source finished, nothing is pending and the event topic is drained.
    Complete,
    /// The source reported a failure.
    SourceFailed(String),
    /// The configured timeout elapsed first.
    TimedOut,
}

impl CompletionStatus {
    /// Whether the run of this publisher completed.
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Counters accumulated by a publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Documents published by the source.
    pub published: u64,
    /// CREATE events received for documents emitted downstream.
    pub created: u64,
    /// FINISH events received.
    pub succeeded: u64,
    /// FAIL events received.
    pub failed: u64,
    /// DROP events received.
    pub dropped: u64,
    /// Documents not yet terminal.
    pub pending: usize,
    /// Terminal events waiting for their creation.
    pub early_terminal: usize,
}

#[derive(Debug, Default)]
struct TrackingState {
    tracker: CompletionTracker,
    stats: PublisherStats,
}

/// Publishes documents for one run and waits for all of them to settle.
#[derive(Debug)]
pub struct Publisher {
    run_id: String,
    topics: TopicNames,
    producer: Arc<dyn QueueProducer>,
    events: tokio::sync::Mutex<Box<dyn QueueConsumer>>,
    state: Mutex<TrackingState>,
    poll_timeout: Duration,
    log_interval: Duration,
    max_pending: Option<usize>,
    capacity: Notify,
    collapsing: bool,
    held: Mutex<Option<Document>>,
}

impl Publisher {
    /// Creates a publisher. `events` must consume the run's event topic.
    pub fn new(
        run_id: impl Into<String>,
        topics: TopicNames,
        producer: Arc<dyn QueueProducer>,
        events: Box<dyn QueueConsumer>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            topics,
            producer,
            events: tokio::sync::Mutex::new(events),
            state: Mutex::new(TrackingState::default()),
            poll_timeout: DEFAULT_EVENT_POLL,
            log_interval: DEFAULT_LOG_INTERVAL,
            max_pending: None,
            capacity: Notify::new(),
            collapsing: false,
            held: Mutex::new(None),
        }
    }

    /// Makes `publish` wait while `max` or more documents are pending.
    #[must_use]
    pub const fn with_max_pending(mut self, max: Option<usize>) -> Self {
        self.max_pending = max;
        self
    }

    /// Enables collapsing of consecutive documents with the same id.
    ///
    /// Collapsing assumes a single publishing task.
    #[must_use]
    pub const fn collapsing(mut self, collapsing: bool) -> Self {
        self.collapsing = collapsing;
        self
    }

    /// Sets the wait per event poll.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the interval between progress log lines.
    #[must_use]
    pub const fn with_log_interval(mut self, interval: Duration) -> Self {
        self.log_interval = interval;
        self
    }

    /// Returns the run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the pipeline name.
    pub fn pipeline(&self) -> &str {
        self.topics.pipeline()
    }

    /// Submits a document for processing.
    ///
    /// Waits first while the pending limit is reached. In collapsing mode
    /// the document may be merged into, or held back behind, its
    /// predecessor.
    pub async fn publish(&self, document: Document) -> Result<(), PublisherError> {
        self.wait_for_capacity().await;
        if !self.collapsing {
            return self.send_for_processing(document).await;
        }

        let ready = {
            let mut held = self.held.lock();
            match held.take() {
                Some(mut previous) if previous.id() == document.id() => {
                    let merged = previous.set_or_add_all(&document);
                    *held = Some(previous);
                    merged?;
                    None
                }
                previous => {
                    *held = Some(document);
                    previous
                }
            }
        };
        match ready {
            Some(previous) => self.send_for_processing(previous).await,
            None => Ok(()),
        }
    }

    /// Sends the document held back by collapsing mode, if any.
    pub async fn flush(&self) -> Result<(), PublisherError> {
        let held = self.held.lock().take();
        match held {
            Some(document) => self.send_for_processing(document).await,
            None => Ok(()),
        }
    }

    async fn wait_for_capacity(&self) {
        let Some(max) = self.max_pending else {
            return;
        };
        loop {
            let notified = self.capacity.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = self.num_pending();
            if pending < max {
                return;
            }
            debug!(run_id = %self.run_id, pending, max, "Waiting for pending documents to settle");
            let _ = tokio::time::timeout(CAPACITY_RECHECK, notified).await;
        }
    }

    /// Stamps the document with the run id, sends it for processing and
    /// starts tracking it.
    ///
    /// The document is tracked only after the send succeeded. A terminal
    /// event that overtakes the tracking step is kept until then.
    async fn send_for_processing(&self, mut document: Document) -> Result<(), PublisherError> {
        document.initialize_run_id(self.run_id.as_str())?;
        let id = document.id().to_string();
        self.producer
            .send(&self.topics.source, &id, document.to_bytes())
            .await?;

        let mut state = self.state.lock();
        state.tracker.on_created(&id);
        state.stats.published += 1;
        debug!(doc_id = %id, run_id = %self.run_id, "Published document");
        Ok(())
    }

    /// Applies one event to the tracking state. Events of other runs are
    /// ignored.
    pub fn handle_event(&self, event: &Event) {
        if event.run_id != self.run_id {
            warn!(
                run_id = %self.run_id,
                event_run_id = %event.run_id,
                doc_id = %event.document_id,
                "Ignoring event from another run"
            );
            return;
        }

        let mut state = self.state.lock();
        match event.event_type {
            EventType::Create => {
                state.tracker.on_created(&event.document_id);
                state.stats.created += 1;
            }
            terminal => {
                state.tracker.on_terminal(&event.document_id);
                match terminal {
                    EventType::Finish => state.stats.succeeded += 1,
                    EventType::Fail => state.stats.failed += 1,
                    _ => state.stats.dropped += 1,
                }
                drop(state);
                self.capacity.notify_waiters();
            }
        }
    }

    /// Whether any tracked document is not yet terminal.
    pub fn has_pending(&self) -> bool {
        !self.state.lock().tracker.is_settled()
    }

    /// Number of tracked documents not yet terminal.
    pub fn num_pending(&self) -> usize {
        self.state.lock().tracker.pending()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> PublisherStats {
        let state = self.state.lock();
        PublisherStats {
            pending: state.tracker.pending(),
            early_terminal: state.tracker.early_terminal(),
            ..state.stats
        }
    }

    /// Consumes events until the run of this publisher is complete.
    ///
    /// A source failure ends the wait at once, whatever is pending. Success
    /// requires, checked in this order, that the source has finished, that
    /// nothing is pending and that no events are left on the topic.
    pub async fn wait_for_completion(
        &self,
        source: &dyn SourceStatus,
        timeout: Option<Duration>,
    ) -> Result<CompletionStatus, PublisherError> {
        let started = Instant::now();
        let mut last_log = started;
        let mut events = self.events.lock().await;

        loop {
            if timeout.is_some_and(|limit| started.elapsed() >= limit) {
                warn!(run_id = %self.run_id, pending = self.num_pending(), "Timed out waiting for completion");
                return Ok(CompletionStatus::TimedOut);
            }

            if let Some(message) = events.poll(self.poll_timeout).await? {
                match Event::from_slice(&message.value) {
                    Ok(event) => self.handle_event(&event),
                    Err(e) => warn!(
                        topic = %message.topic,
                        offset = message.offset,
                        error = %e,
                        "Skipping malformed event"
                    ),
                }
                events.commit().await?;
            }

            if let Some(reason) = source.failure() {
                warn!(run_id = %self.run_id, reason = %reason, "Source failed");
                return Ok(CompletionStatus::SourceFailed(reason));
            }

            if source.is_finished() && !self.has_pending() && events.lag().await? == 0 {
                info!(run_id = %self.run_id, stats = ?self.stats(), "Run complete");
                return Ok(CompletionStatus::Complete);
            }

            if last_log.elapsed() >= self.log_interval {
                info!(
                    run_id = %self.run_id,
                    pipeline = %self.pipeline(),
                    "Waiting on {} documents",
                    self.num_pending()
                );
                last_log = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryBroker;
    use pretty_assertions::assert_eq;

    const RUN: &str = "run-1";

    fn publisher(broker: &MemoryBroker) -> Publisher {
        let topics = TopicNames::for_pipeline("p");
        let events = broker.consumer("publisher", topics.events(RUN));
        Publisher::new(RUN, topics, Arc::new(broker.clone()), Box::new(events))
            .with_poll_timeout(Duration::from_millis(5))
    }

    async fn emit(broker: &MemoryBroker, id: &str, event_type: EventType) {
        let event = Event::new(id, RUN, event_type);
        broker
            .send("p_event_run-1", id, event.to_bytes().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_stamps_run_id_and_tracks() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);

        publisher.publish(Document::new("d1").unwrap()).await.unwrap();

        let sent = broker.messages("p_source");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].key, "d1");
        let doc = Document::from_slice(&sent[0].value).unwrap();
        assert_eq!(doc.run_id(), Some(RUN));
        assert_eq!(publisher.num_pending(), 1);
        assert_eq!(publisher.stats().published, 1);
    }

    #[tokio::test]
    async fn test_publish_rejects_document_of_another_run() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let doc = Document::with_run_id("d1", "other").unwrap();
        assert!(publisher.publish(doc).await.is_err());
        assert!(broker.messages("p_source").is_empty());
        assert!(!publisher.has_pending());
    }

    #[tokio::test]
    async fn test_handle_event_counts_outcomes() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();

        publisher.handle_event(&Event::new("c1", RUN, EventType::Create));
        publisher.handle_event(&Event::new("c2", RUN, EventType::Drop));
        publisher.handle_event(&Event::new("c1", RUN, EventType::Fail));
        publisher.handle_event(&Event::new("d1", RUN, EventType::Finish));
        assert_eq!(publisher.num_pending(), 0);

        publisher.handle_event(&Event::new("c2", RUN, EventType::Create));
        let stats = publisher.stats();
        assert_eq!(
            stats,
            PublisherStats {
                published: 1,
                created: 2,
                succeeded: 1,
                failed: 1,
                dropped: 1,
                pending: 0,
                early_terminal: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_publish_waits_below_pending_limit() {
        let broker = MemoryBroker::default();
        let publisher = Arc::new(publisher(&broker).with_max_pending(Some(1)));
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();

        let second = {
            let publisher = Arc::clone(&publisher);
            tokio::spawn(async move { publisher.publish(Document::new("d2").unwrap()).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!second.is_finished());
        assert_eq!(broker.messages("p_source").len(), 1);

        publisher.handle_event(&Event::new("d1", RUN, EventType::Finish));
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(broker.messages("p_source").len(), 2);
        assert_eq!(publisher.num_pending(), 1);
    }

    #[tokio::test]
    async fn test_collapsing_merges_consecutive_documents() {
        let broker = MemoryBroker::new(1);
        let publisher = publisher(&broker).collapsing(true);

        for (id, value) in [("a", "1"), ("a", "2"), ("b", "3"), ("a", "4")] {
            let mut doc = Document::new(id).unwrap();
            doc.set_field("v", value).unwrap();
            publisher.publish(doc).await.unwrap();
        }
        assert_eq!(broker.messages("p_source").len(), 2);

        publisher.flush().await.unwrap();
        publisher.flush().await.unwrap();

        let sent: Vec<Document> = broker
            .messages("p_source")
            .iter()
            .map(|m| Document::from_slice(&m.value).unwrap())
            .collect();
        let ids: Vec<&str> = sent.iter().map(Document::id).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(sent[0].get_string_list("v").unwrap(), vec!["1", "2"]);
        assert_eq!(sent[2].get_string("v").as_deref(), Some("4"));
        assert_eq!(publisher.stats().published, 3);
        assert_eq!(publisher.num_pending(), 3);
    }

    #[tokio::test]
    async fn test_events_of_other_runs_are_ignored() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();
        publisher.handle_event(&Event::new("d1", "run-2", EventType::Finish));
        assert_eq!(publisher.num_pending(), 1);
    }

    #[tokio::test]
    async fn test_wait_completes_when_all_events_arrive() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let source = SourceState::new();

        publisher.publish(Document::new("d1").unwrap()).await.unwrap();
        emit(&broker, "child", EventType::Finish).await;
        emit(&broker, "child", EventType::Create).await;
        emit(&broker, "d1", EventType::Finish).await;
        source.mark_finished();

        let status = publisher.wait_for_completion(&source, None).await.unwrap();
        assert_eq!(status, CompletionStatus::Complete);
        assert_eq!(publisher.stats().succeeded, 2);
        assert_eq!(broker.committed("publisher", "p_event_run-1"), 3);
    }

    #[tokio::test]
    async fn test_wait_reports_source_failure_despite_pending() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let source = SourceState::new();
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();
        source.mark_failed("connector crashed");

        let status = publisher.wait_for_completion(&source, None).await.unwrap();
        assert_eq!(status, CompletionStatus::SourceFailed("connector crashed".into()));
        assert!(publisher.has_pending());
    }

    #[tokio::test]
    async fn test_wait_does_not_finish_while_source_runs() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let source = SourceState::new();

        let status = publisher
            .wait_for_completion(&source, Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert_eq!(status, CompletionStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_times_out_with_pending_documents() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let source = SourceState::new();
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();
        source.mark_finished();

        let status = publisher
            .wait_for_completion(&source, Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert_eq!(status, CompletionStatus::TimedOut);
        assert_eq!(publisher.num_pending(), 1);
    }

    #[tokio::test]
    async fn test_malformed_events_are_skipped() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let source = SourceState::new();
        publisher.publish(Document::new("d1").unwrap()).await.unwrap();
        broker
            .send("p_event_run-1", "junk", b"not json".to_vec())
            .await
            .unwrap();
        emit(&broker, "d1", EventType::Finish).await;
        source.mark_finished();

        let status = publisher.wait_for_completion(&source, None).await.unwrap();
        assert!(status.is_complete());
    }
}
