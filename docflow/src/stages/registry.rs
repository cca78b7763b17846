//! Stage registry.
//!
//! Maps a stage type identifier from configuration to a factory that builds
//! the stage. Pipelines are assembled from registered types at startup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{DropDocumentStage, NoOpStage, SetStaticValuesStage, Stage};
use crate::config::StageConfig;
use crate::errors::StageError;

/// Factory function type for creating stages.
pub type StageFactory = Arc<dyn Fn(&StageConfig) -> Result<Arc<dyn Stage>, StageError> + Send + Sync>;

/// Registry of stage factories keyed by type.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in stages: `noop`,
    /// `drop_document` and `set_static_values`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("noop", |_| Ok(Arc::new(NoOpStage::new()) as Arc<dyn Stage>));
        registry.register("drop_document", |_| {
            Ok(Arc::new(DropDocumentStage) as Arc<dyn Stage>)
        });
        registry.register("set_static_values", |config| {
            Ok(Arc::new(SetStaticValuesStage::from_config(config)?) as Arc<dyn Stage>)
        });
        registry
    }

    /// Registers a factory, replacing any previous one for the type.
    pub fn register<F>(&mut self, stage_type: impl Into<String>, factory: F)
    where
        F: Fn(&StageConfig) -> Result<Arc<dyn Stage>, StageError> + Send + Sync + 'static,
    {
        self.factories.insert(stage_type.into(), Arc::new(factory));
    }

    /// Checks whether a type is registered.
    #[must_use]
    pub fn contains(&self, stage_type: &str) -> bool {
        self.factories.contains_key(stage_type)
    }

    /// Lists registered types.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Builds a stage from its configuration. Returns `None` for unknown
    /// types.
    pub fn create(&self, config: &StageConfig) -> Option<Result<Arc<dyn Stage>, StageError>> {
        self.factories
            .get(&config.stage_type)
            .map(|factory| factory(config))
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("types", &self.types())
            .finish()
    }
}
