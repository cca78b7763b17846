//! Connectors for exercising runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::connector::Connector;
use crate::document::Document;
use crate::errors::ConnectorError;
use crate::publisher::Publisher;

/// A connector that publishes a fixed list of empty documents.
#[derive(Debug)]
pub struct ListConnector {
    name: String,
    pipeline: String,
    ids: Vec<String>,
    collapsing: bool,
    closed: AtomicBool,
}

impl ListConnector {
    /// Creates a connector publishing one document per id.
    pub fn new<I>(name: impl Into<String>, pipeline: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.into(),
            pipeline: pipeline.into(),
            ids: ids.into_iter().map(Into::into).collect(),
            collapsing: false,
            closed: AtomicBool::new(false),
        }
    }

    /// Asks for a collapsing publisher.
    #[must_use]
    pub const fn collapsing(mut self) -> Self {
        self.collapsing = true;
        self
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ListConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    fn requires_collapsing_publisher(&self) -> bool {
        self.collapsing
    }

    async fn execute(&self, publisher: &Publisher) -> Result<(), ConnectorError> {
        for id in &self.ids {
            let doc = Document::new(id.as_str()).map_err(|e| ConnectorError::Config(e.to_string()))?;
            publisher
                .publish(doc)
                .await
                .map_err(|e| ConnectorError::Publish(e.to_string()))?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A connector whose `execute` always fails.
#[derive(Debug)]
pub struct FailingConnector {
    name: String,
    pipeline: String,
    reason: String,
    closed: AtomicBool,
}

impl FailingConnector {
    /// Creates a connector failing with `reason`.
    pub fn new(name: impl Into<String>, pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipeline: pipeline.into(),
            reason: reason.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FailingConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    async fn execute(&self, _publisher: &Publisher) -> Result<(), ConnectorError> {
        Err(ConnectorError::Execution {
            connector: self.name.clone(),
            reason: self.reason.clone(),
        })
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
