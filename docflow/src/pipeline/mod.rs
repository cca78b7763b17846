//! Pipeline building and execution.
//!
//! A [`Pipeline`] applies its stages in order to a document and to every
//! child a stage emits. A child emitted by stage *k* continues with stages
//! *k+1..N* only; the input document passes through all of them.

mod builder;
mod metrics;
mod spec;

#[cfg(test)]
mod integration_tests;

use std::time::Instant;

use tracing::{debug, info};

use crate::document::Document;
use crate::errors::PipelineError;

pub use builder::PipelineBuilder;
pub use metrics::{StageMetrics, StageMetricsSnapshot};
pub use spec::StageSpec;

/// Outcome of running one document through a pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    /// Surviving documents: the input first, then descendants in the order
    /// they were emitted.
    pub documents: Vec<Document>,
    /// Documents a stage marked as dropped.
    pub dropped: Vec<Document>,
}

/// An ordered chain of stages.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
    metrics: Vec<StageMetrics>,
}

impl Pipeline {
    /// Creates a pipeline from stage specifications.
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        let metrics = stages.iter().map(|_| StageMetrics::default()).collect();
        Self {
            name: name.into(),
            stages,
            metrics,
        }
    }

    /// Returns the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Runs the start hook of every stage.
    pub async fn start(&self) -> Result<(), PipelineError> {
        for spec in &self.stages {
            spec.runner
                .start()
                .await
                .map_err(|source| PipelineError::Lifecycle {
                    stage: spec.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Runs the stop hook of every stage, returning the first failure.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let mut first_error = None;
        for spec in &self.stages {
            if let Err(source) = spec.runner.stop().await {
                first_error.get_or_insert(PipelineError::Lifecycle {
                    stage: spec.name.clone(),
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Runs a document and all of its descendants through the stages.
    ///
    /// # Errors
    ///
    /// The first stage failure aborts processing of the whole input.
    pub async fn process(&self, document: Document) -> Result<PipelineResult, PipelineError> {
        let mut docs = vec![document];

        for (spec, metrics) in self.stages.iter().zip(&self.metrics) {
            let mut emitted = Vec::new();
            for doc in &mut docs {
                if !spec.applies_to(doc) {
                    metrics.record_skip();
                    continue;
                }
                let started = Instant::now();
                match spec.runner.process_document(doc).await {
                    Ok(children) => {
                        metrics.record_success(started.elapsed(), children.len());
                        for mut child in children {
                            child.inherit_run_id(doc);
                            emitted.push(child);
                        }
                    }
                    Err(source) => {
                        metrics.record_error(started.elapsed());
                        return Err(PipelineError::Stage {
                            stage: spec.name.clone(),
                            doc_id: doc.id().to_string(),
                            source,
                        });
                    }
                }
            }
            if !emitted.is_empty() {
                debug!(
                    pipeline = %self.name,
                    stage = %spec.name,
                    children = emitted.len(),
                    "Stage emitted children"
                );
            }
            docs.extend(emitted);
        }

        let (dropped, documents) = docs.into_iter().partition(Document::is_dropped);
        Ok(PipelineResult { documents, dropped })
    }

    /// Returns a copy of every stage's counters.
    pub fn metrics(&self) -> Vec<StageMetricsSnapshot> {
        self.stages
            .iter()
            .zip(&self.metrics)
            .map(|(spec, metrics)| metrics.snapshot(&spec.name))
            .collect()
    }

    /// Logs every stage's counters.
    pub fn log_metrics(&self) {
        for snapshot in self.metrics() {
            info!(
                pipeline = %self.name,
                stage = %snapshot.stage,
                processed = snapshot.processed,
                skipped = snapshot.skipped,
                errors = snapshot.errors,
                children = snapshot.children,
                mean_latency_us = u64::try_from(snapshot.mean_latency().as_micros()).unwrap_or(u64::MAX),
                "Stage metrics"
            );
        }
    }
}
