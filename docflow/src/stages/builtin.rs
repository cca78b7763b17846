//! Stages available in every registry.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Stage;
use crate::config::StageConfig;
use crate::document::{Document, UpdateMode};
use crate::errors::StageError;

/// A stage that passes documents through untouched.
#[derive(Debug, Clone, Default)]
pub struct NoOpStage;

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for NoOpStage {
    async fn process_document(&self, _doc: &mut Document) -> Result<Vec<Document>, StageError> {
        Ok(Vec::new())
    }
}

/// A stage that marks every document it sees as dropped.
///
/// Usually paired with a condition.
#[derive(Debug, Clone, Default)]
pub struct DropDocumentStage;

#[async_trait]
impl Stage for DropDocumentStage {
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        doc.set_dropped(true);
        Ok(Vec::new())
    }
}

/// A stage that writes fixed values into every document.
#[derive(Debug, Clone)]
pub struct SetStaticValuesStage {
    fields: Map<String, Value>,
    mode: UpdateMode,
}

impl SetStaticValuesStage {
    /// Creates a stage writing `fields` with the given update mode.
    pub fn new(fields: Map<String, Value>, mode: UpdateMode) -> Self {
        Self { fields, mode }
    }

    /// Builds the stage from its `fields` and optional `update_mode` params.
    pub fn from_config(config: &StageConfig) -> Result<Self, StageError> {
        let fields: Map<String, Value> = config
            .param("fields")
            .map_err(|e| StageError::Config(e.to_string()))?
            .ok_or_else(|| StageError::Config("set_static_values requires 'fields'".to_string()))?;
        let mode = config
            .param("update_mode")
            .map_err(|e| StageError::Config(e.to_string()))?
            .unwrap_or_default();
        Ok(Self::new(fields, mode))
    }
}

#[async_trait]
impl Stage for SetStaticValuesStage {
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        for (name, value) in &self.fields {
            match value {
                Value::Array(items) => doc.update(name, self.mode, items)?,
                single => doc.update(name, self.mode, [single])?,
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_drop_marks_document() {
        let mut doc = Document::new("d").unwrap();
        DropDocumentStage.process_document(&mut doc).await.unwrap();
        assert!(doc.is_dropped());
    }

    #[tokio::test]
    async fn test_static_values_respect_mode() {
        let config = StageConfig::new("set_static_values")
            .with_param("fields", json!({"source": "web", "tags": ["a", "b"]}))
            .with_param("update_mode", json!("skip"));
        let stage = SetStaticValuesStage::from_config(&config).unwrap();

        let mut doc = Document::new("d").unwrap();
        doc.set_field("source", "file").unwrap();
        stage.process_document(&mut doc).await.unwrap();

        assert_eq!(doc.get_string("source").as_deref(), Some("file"));
        assert_eq!(doc.get_string_list("tags").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_static_values_require_fields() {
        let config = StageConfig::new("set_static_values");
        assert!(matches!(
            SetStaticValuesStage::from_config(&config),
            Err(StageError::Config(_))
        ));
    }
}
