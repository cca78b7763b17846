//! A connector that generates numbered documents.

use async_trait::async_trait;

use super::Connector;
use crate::config::ConnectorConfig;
use crate::document::Document;
use crate::errors::ConnectorError;
use crate::publisher::Publisher;

/// Publishes `num_docs` empty documents with ids `{id_prefix}{n}` for `n`
/// from 1.
#[derive(Debug, Clone)]
pub struct SequenceConnector {
    name: String,
    pipeline: String,
    num_docs: u64,
    id_prefix: String,
}

impl SequenceConnector {
    /// Creates a sequence connector.
    pub fn new(name: impl Into<String>, pipeline: impl Into<String>, num_docs: u64) -> Self {
        Self {
            name: name.into(),
            pipeline: pipeline.into(),
            num_docs,
            id_prefix: String::new(),
        }
    }

    /// Sets the id prefix.
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Builds the connector from its `num_docs` and optional `id_prefix`
    /// params. `config.name` must already be resolved.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let invalid = |e: serde_json::Error| ConnectorError::Config(e.to_string());
        let num_docs = config
            .param::<u64>("num_docs")
            .map_err(invalid)?
            .ok_or_else(|| ConnectorError::Config("sequence requires 'num_docs'".to_string()))?;
        let prefix = config.param::<String>("id_prefix").map_err(invalid)?;
        let name = config.name.clone().unwrap_or_else(|| config.resolved_name(0));

        let connector = Self::new(name, &config.pipeline, num_docs);
        Ok(match prefix {
            Some(prefix) => connector.with_id_prefix(prefix),
            None => connector,
        })
    }
}

#[async_trait]
impl Connector for SequenceConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    async fn execute(&self, publisher: &Publisher) -> Result<(), ConnectorError> {
        for n in 1..=self.num_docs {
            let doc = Document::new(format!("{}{n}", self.id_prefix))
                .map_err(|e| ConnectorError::Config(e.to_string()))?;
            publisher
                .publish(doc)
                .await
                .map_err(|e| ConnectorError::Publish(e.to_string()))?;
        }
        Ok(())
    }
}
