//! Document sources.
//!
//! A [`Connector`] reads some source and hands every document to the run's
//! [`Publisher`]. The runner drives it on its own task through
//! [`spawn_connector`], which records the outcome in a [`SourceState`] for
//! the publisher's completion wait.

mod registry;
mod sequence;

use std::any::Any;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::ConnectorError;
use crate::publisher::{Publisher, SourceState};

pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use sequence::SequenceConnector;

/// A source-specific producer of documents.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Unique name within a run.
    fn name(&self) -> &str;

    /// Pipeline that processes the published documents.
    fn pipeline_name(&self) -> &str;

    /// Whether consecutive documents with the same id are merged before
    /// they are sent.
    fn requires_collapsing_publisher(&self) -> bool {
        false
    }

    /// Called before `execute`.
    async fn pre_execute(&self, _run_id: &str) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Publishes documents until the source is exhausted.
    async fn execute(&self, publisher: &Publisher) -> Result<(), ConnectorError>;

    /// Called after a successful `execute`.
    async fn post_execute(&self, _run_id: &str) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Releases resources. Always called, even after a failure.
    async fn close(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Runs a connector's lifecycle on a new task.
///
/// Any failure, including a panic, is recorded in `state` before it is
/// marked finished, so the publisher never sees a finished source whose
/// failure is still unknown. A collapsing publisher is flushed after
/// `execute`.
pub fn spawn_connector(
    connector: Arc<dyn Connector>,
    publisher: Arc<Publisher>,
    state: Arc<SourceState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let run_id = publisher.run_id().to_string();
        let name = connector.name().to_string();
        info!(connector = %name, run_id = %run_id, "Connector started");

        let lifecycle = async {
            connector.pre_execute(&run_id).await?;
            connector.execute(&publisher).await?;
            publisher
                .flush()
                .await
                .map_err(|e| ConnectorError::Publish(e.to_string()))?;
            connector.post_execute(&run_id).await
        };

        match AssertUnwindSafe(lifecycle).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(connector = %name, error = %e, "Connector failed");
                state.mark_failed(e.to_string());
            }
            Err(panic) => {
                let reason = format!("connector panicked: {}", panic_message(panic.as_ref()));
                error!(connector = %name, error = %reason, "Connector failed");
                state.mark_failed(reason);
            }
        }
        if let Err(e) = connector.close().await {
            warn!(connector = %name, error = %e, "Connector close failed");
            state.mark_failed(e.to_string());
        }
        state.mark_finished();
        info!(connector = %name, published = publisher.stats().published, "Connector finished");
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{MemoryBroker, TopicNames};
    use crate::publisher::{CompletionStatus, SourceStatus};
    use crate::testing::{FailingConnector, ListConnector};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn publisher(broker: &MemoryBroker) -> Arc<Publisher> {
        let topics = TopicNames::for_pipeline("p");
        let events = broker.consumer("publisher", topics.events("r1"));
        Arc::new(
            Publisher::new("r1", topics, Arc::new(broker.clone()), Box::new(events))
                .with_poll_timeout(Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_successful_connector_marks_finished() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let state = Arc::new(SourceState::new());
        let connector = Arc::new(ListConnector::new("list", "p", ["a", "b"]));

        spawn_connector(connector.clone(), publisher.clone(), state.clone())
            .await
            .unwrap();

        assert!(state.is_finished());
        assert!(state.failure().is_none());
        assert_eq!(publisher.stats().published, 2);
        assert!(connector.is_closed());
        assert_eq!(broker.messages("p_source").len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_close_still_runs() {
        let broker = MemoryBroker::default();
        let state = Arc::new(SourceState::new());
        let connector = Arc::new(FailingConnector::new("bad", "p", "source unreachable"));

        spawn_connector(connector.clone(), publisher(&broker), state.clone())
            .await
            .unwrap();

        assert!(state.is_finished());
        assert!(state.failure().unwrap().contains("source unreachable"));
        assert!(connector.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_connector_fails_the_source() {
        let broker = MemoryBroker::default();
        let publisher = publisher(&broker);
        let state = Arc::new(SourceState::new());
        let connector = Arc::new(PanickingConnector::default());

        spawn_connector(connector.clone(), publisher.clone(), state.clone())
            .await
            .unwrap();

        assert!(state.is_finished());
        assert!(state.failure().unwrap().contains("cursor vanished"));
        assert!(connector.closed.load(Ordering::SeqCst));

        let status = publisher
            .wait_for_completion(state.as_ref(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(matches!(status, CompletionStatus::SourceFailed(reason) if reason.contains("cursor vanished")));
    }

    #[tokio::test]
    async fn test_collapsing_publisher_is_flushed_after_execute() {
        let broker = MemoryBroker::default();
        let topics = TopicNames::for_pipeline("p");
        let events = broker.consumer("publisher", topics.events("r1"));
        let publisher = Arc::new(
            Publisher::new("r1", topics, Arc::new(broker.clone()), Box::new(events)).collapsing(true),
        );
        let state = Arc::new(SourceState::new());
        let connector = Arc::new(ListConnector::new("list", "p", ["a", "a", "b"]));

        spawn_connector(connector, publisher.clone(), state.clone())
            .await
            .unwrap();

        let mut keys: Vec<String> = broker.messages("p_source").into_iter().map(|m| m.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(state.failure().is_none());
    }

    #[derive(Debug, Default)]
    struct PanickingConnector {
        closed: AtomicBool,
    }

    #[async_trait]
    impl Connector for PanickingConnector {
        fn name(&self) -> &str {
            "panicky"
        }

        fn pipeline_name(&self) -> &str {
            "p"
        }

        async fn execute(&self, _publisher: &Publisher) -> Result<(), ConnectorError> {
            panic!("cursor vanished");
        }

        async fn close(&self) -> Result<(), ConnectorError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
