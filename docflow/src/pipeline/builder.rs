//! Pipeline builder with validation.

use std::collections::HashSet;
use std::sync::Arc;

use super::{Pipeline, StageSpec};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::stages::{Stage, StageRegistry};

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
    names: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Appends a stage named `stage_N` after its 1-based position.
    pub fn stage(mut self, runner: Arc<dyn Stage>) -> Result<Self, PipelineError> {
        let name = self.default_stage_name();
        self.add_stage_spec(StageSpec::new(name, runner))?;
        Ok(self)
    }

    /// Appends a named stage.
    pub fn named_stage(
        mut self,
        name: impl Into<String>,
        runner: Arc<dyn Stage>,
    ) -> Result<Self, PipelineError> {
        self.add_stage_spec(StageSpec::new(name, runner))?;
        Ok(self)
    }

    /// Appends a stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if another stage already uses the name.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineError> {
        if !self.names.insert(spec.name.clone()) {
            return Err(PipelineError::DuplicateStage {
                pipeline: self.name.clone(),
                stage: spec.name,
            });
        }
        self.stages.push(spec);
        Ok(())
    }

    fn default_stage_name(&self) -> String {
        format!("stage_{}", self.stages.len() + 1)
    }

    /// Builds a pipeline from configuration, resolving stage types through
    /// `registry`.
    pub fn from_config(config: &PipelineConfig, registry: &StageRegistry) -> Result<Pipeline, PipelineError> {
        let mut builder = Self::new(&config.name);
        for stage in &config.stages {
            let name = stage
                .name
                .clone()
                .unwrap_or_else(|| builder.default_stage_name());
            let runner = registry
                .create(stage)
                .ok_or_else(|| PipelineError::UnknownStageType(stage.stage_type.clone()))?
                .map_err(|source| PipelineError::Build {
                    stage: name.clone(),
                    source,
                })?;
            builder.add_stage_spec(StageSpec::new(name, runner).with_conditions(stage.conditions.clone()))?;
        }
        Ok(builder.build())
    }

    /// Tries every configured stage and returns all problems found instead
    /// of stopping at the first.
    pub fn validate_config(config: &PipelineConfig, registry: &StageRegistry) -> Vec<PipelineError> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();
        for (index, stage) in config.stages.iter().enumerate() {
            let name = stage.name.clone().unwrap_or_else(|| format!("stage_{}", index + 1));
            match registry.create(stage) {
                None => errors.push(PipelineError::UnknownStageType(stage.stage_type.clone())),
                Some(Err(source)) => errors.push(PipelineError::Build {
                    stage: name.clone(),
                    source,
                }),
                Some(Ok(_)) => {}
            }
            if !names.insert(name.clone()) {
                errors.push(PipelineError::DuplicateStage {
                    pipeline: config.name.clone(),
                    stage: name,
                });
            }
        }
        errors
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline::new(self.name, self.stages)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
