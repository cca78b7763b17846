//! Single-process runs over the in-memory broker and counter store.

use std::sync::Arc;

use tracing::info;

use super::{RunEnvironment, RunResult, Runner};
use crate::config::EngineConfig;
use crate::connector::ConnectorRegistry;
use crate::coordination::{BackoffPolicy, InMemoryCounterStore, RetryCounterStore, RetryingCounterStore};
use crate::errors::{DocflowError, IndexerError, RunError, WorkerError};
use crate::indexer::{Indexer, IndexerSink};
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{MemoryBroker, QueueConsumer, QueueProducer, TopicNames};
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::stages::StageRegistry;
use crate::worker::{Worker, WorkerPool};

/// Consumer group used by publishers on event topics.
const PUBLISHER_GROUP: &str = "docflow_publishers";

/// A run environment backed by a [`MemoryBroker`].
#[derive(Debug, Clone, Default)]
pub struct LocalEnvironment {
    broker: MemoryBroker,
}

impl LocalEnvironment {
    /// Wraps a broker.
    pub const fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    /// Returns the broker.
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

impl RunEnvironment for LocalEnvironment {
    fn producer(&self) -> Arc<dyn QueueProducer> {
        Arc::new(self.broker.clone())
    }

    fn event_consumer(&self, topics: &TopicNames, run_id: &str) -> Box<dyn QueueConsumer> {
        Box::new(self.broker.consumer(PUBLISHER_GROUP, topics.events(run_id)))
    }
}

/// Runs every configured connector in one process.
///
/// Workers and indexers are started for each pipeline a connector uses and
/// stopped once the runner is done. Indexed documents go to `sink`.
pub async fn run_local(
    config: &EngineConfig,
    stages: &StageRegistry,
    connectors: &ConnectorRegistry,
    sink: Arc<dyn IndexerSink>,
) -> Result<RunResult, DocflowError> {
    config.validate()?;
    let connector_list = connectors.create_all(&config.connectors)?;

    let env = LocalEnvironment::default();
    let counters: Arc<dyn RetryCounterStore> = Arc::new(RetryingCounterStore::new(
        InMemoryCounterStore::new(),
        BackoffPolicy::from(&config.coordination),
    ));
    let shutdown = ShutdownSignal::new();
    let mut workers: WorkerPool<WorkerError> = WorkerPool::new("workers", shutdown.clone());
    let mut indexers: WorkerPool<IndexerError> = WorkerPool::new("indexers", shutdown.clone());

    let mut pipelines: Vec<Arc<Pipeline>> = Vec::new();
    for connector in &connector_list {
        let name = connector.pipeline_name();
        if pipelines.iter().any(|p| p.name() == name) {
            continue;
        }
        let pipeline_config = config
            .pipeline(name)
            .ok_or_else(|| RunError::MissingPipeline(name.to_string()))?;
        let pipeline = Arc::new(PipelineBuilder::from_config(pipeline_config, stages)?);
        pipeline.start().await?;
        let topics = TopicNames::for_pipeline(name);

        for n in 1..=config.worker.num_workers.max(1) {
            let consumer = env.broker().consumer(&config.worker.consumer_group, topics.source.clone());
            let mut worker = Worker::new(
                format!("{name}-worker-{n}"),
                Arc::clone(&pipeline),
                topics.clone(),
                Box::new(consumer),
                env.producer(),
                config.worker.clone(),
            )
            .with_counter_store(Arc::clone(&counters));
            let signal = shutdown.clone();
            workers.spawn(async move { worker.run(signal).await });
        }

        for n in 1..=config.indexer.num_indexers.max(1) {
            let consumer = env
                .broker()
                .consumer(&config.indexer.consumer_group, topics.destination.clone());
            let mut indexer = Indexer::new(
                format!("{name}-indexer-{n}"),
                topics.clone(),
                Box::new(consumer),
                env.producer(),
                Arc::clone(&sink),
                &config.indexer,
            );
            let signal = shutdown.clone();
            indexers.spawn(async move { indexer.run(signal).await });
        }
        pipelines.push(pipeline);
    }

    info!(workers = workers.len(), indexers = indexers.len(), "Local run started");
    let runner = Runner::new(Arc::new(env), config.runner.clone());
    let result = runner.run(connector_list).await;

    shutdown.terminate("run finished");
    let workers_result = workers.join().await;
    let indexers_result = indexers.join().await;
    for pipeline in &pipelines {
        pipeline.log_metrics();
        pipeline.stop().await?;
    }

    let result = result?;
    workers_result?;
    indexers_result?;
    Ok(result)
}
