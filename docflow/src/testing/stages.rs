//! Stages for exercising pipelines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::document::Document;
use crate::errors::StageError;
use crate::stages::Stage;

/// A stage that records the id of every document it processes.
#[derive(Debug, Default)]
pub struct RecordingStage {
    seen: Mutex<Vec<String>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ids processed so far, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        self.seen.lock().push(doc.id().to_string());
        Ok(Vec::new())
    }
}

/// A stage that emits `count` children per document.
///
/// Children are named `{parent}-child-{i}` starting at 1 and carry their
/// position in `child_index`.
#[derive(Debug)]
pub struct EmitChildrenStage {
    count: usize,
}

impl EmitChildrenStage {
    /// Creates a stage emitting `count` children per document.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self { count }
    }
}

#[async_trait]
impl Stage for EmitChildrenStage {
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        (1..=self.count)
            .map(|i| {
                let mut child = Document::new(format!("{}-child-{i}", doc.id()))?;
                child.set_field("child_index", i as u64)?;
                Ok(child)
            })
            .collect()
    }
}

/// A stage that fails, either on every document or on a single id.
#[derive(Debug)]
pub struct FailingStage {
    message: String,
    only_for: Option<String>,
}

impl FailingStage {
    /// Creates a stage failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            only_for: None,
        }
    }

    /// Restricts failures to the document with `id`.
    #[must_use]
    pub fn only_for(mut self, id: impl Into<String>) -> Self {
        self.only_for = Some(id.into());
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        match &self.only_for {
            Some(id) if id != doc.id() => Ok(Vec::new()),
            _ => Err(StageError::failed(self.message.clone())),
        }
    }
}

/// A stage that sleeps before passing the document through.
#[derive(Debug)]
pub struct SlowStage {
    delay: Duration,
}

impl SlowStage {
    /// Creates a stage sleeping for `delay` per document.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Stage for SlowStage {
    async fn process_document(&self, _doc: &mut Document) -> Result<Vec<Document>, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}
