//! Run orchestration.
//!
//! A [`Runner`] executes connectors strictly one after another. Each gets a
//! dedicated [`Publisher`]; the next connector starts only after the
//! previous one's documents have all reached a terminal state. The first
//! connector that fails or times out ends the run and the rest are skipped.

mod local;
mod result;
mod validation;

#[cfg(test)]
mod runner_tests;

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::connector::{spawn_connector, Connector};
use crate::errors::RunError;
use crate::messaging::{QueueConsumer, QueueProducer, TopicNames};
use crate::publisher::{CompletionStatus, Publisher, SourceState};
use crate::utils::generate_run_id;

pub use local::{run_local, LocalEnvironment};
pub use result::{ConnectorResult, ConnectorStatus, RunResult};
pub use validation::{validate_config, ValidationEntry, ValidationReport};

/// Queue access a runner needs to publish and to follow events.
pub trait RunEnvironment: Send + Sync {
    /// Producer used by publishers.
    fn producer(&self) -> Arc<dyn QueueProducer>;

    /// A consumer of the event topic of `run_id` for `topics`' pipeline.
    fn event_consumer(&self, topics: &TopicNames, run_id: &str) -> Box<dyn QueueConsumer>;
}

/// Sequences the connectors of one run.
pub struct Runner {
    run_id: String,
    config: RunnerConfig,
    env: Arc<dyn RunEnvironment>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner with a fresh run id.
    pub fn new(env: Arc<dyn RunEnvironment>, config: RunnerConfig) -> Self {
        Self {
            run_id: generate_run_id(),
            config,
            env,
        }
    }

    /// Overrides the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Returns the run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Runs one connector and waits until its documents are settled.
    pub async fn run_connector(&self, connector: Arc<dyn Connector>) -> Result<ConnectorResult, RunError> {
        let name = connector.name().to_string();
        let topics = TopicNames::for_pipeline(connector.pipeline_name());
        let events = self.env.event_consumer(&topics, &self.run_id);
        let publisher = Arc::new(
            Publisher::new(self.run_id.as_str(), topics, self.env.producer(), events)
                .with_poll_timeout(self.config.event_poll())
                .with_log_interval(self.config.log_interval())
                .with_max_pending(self.config.max_pending_docs)
                .collapsing(connector.requires_collapsing_publisher()),
        );
        let state = Arc::new(SourceState::new());

        info!(connector = %name, run_id = %self.run_id, pipeline = %publisher.pipeline(), "Running connector");
        let started = Instant::now();
        let task = spawn_connector(connector, Arc::clone(&publisher), Arc::clone(&state));

        let status = publisher
            .wait_for_completion(state.as_ref(), self.config.connector_timeout())
            .await;
        if matches!(status, Ok(CompletionStatus::Complete | CompletionStatus::SourceFailed(_))) {
            task.await.map_err(|e| RunError::Join(e.to_string()))?;
        } else {
            task.abort();
        }

        let result = ConnectorResult {
            name,
            status: status?.into(),
            stats: publisher.stats(),
            duration: started.elapsed(),
        };
        info!("{}", result.message());
        Ok(result)
    }

    /// Runs connectors in order. After the first one that does not complete,
    /// the remaining ones are skipped.
    pub async fn run(&self, connectors: Vec<Arc<dyn Connector>>) -> Result<RunResult, RunError> {
        let mut run = RunResult {
            run_id: self.run_id.clone(),
            results: Vec::new(),
            skipped: Vec::new(),
        };

        for connector in connectors {
            if run.results.iter().any(|r| !r.is_complete()) {
                warn!(connector = %connector.name(), "Skipping connector after earlier failure");
                run.skipped.push(connector.name().to_string());
                continue;
            }
            run.results.push(self.run_connector(connector).await?);
        }

        info!(run_id = %self.run_id, "{}", run.summary());
        Ok(run)
    }
}
