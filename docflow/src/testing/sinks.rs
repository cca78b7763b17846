//! Sinks for exercising indexers.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::document::Document;
use crate::errors::SinkError;
use crate::indexer::IndexerSink;

/// A sink that keeps every batch it accepts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<Document>>>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Creates a new recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches accepted so far, as document ids.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .iter()
            .map(|batch| batch.iter().map(|d| d.id().to_string()).collect())
            .collect()
    }

    /// Every accepted id, in delivery order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.batches.lock().iter().flatten().map(|d| d.id().to_string()).collect()
    }

    /// Every accepted document, in delivery order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexerSink for RecordingSink {
    async fn send(&self, documents: &[Document]) -> Result<(), SinkError> {
        self.batches.lock().push(documents.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A sink that rejects every batch.
#[derive(Debug)]
pub struct FailingSink {
    message: String,
}

impl FailingSink {
    /// Creates a sink failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl IndexerSink for FailingSink {
    async fn send(&self, _documents: &[Document]) -> Result<(), SinkError> {
        Err(SinkError::new(self.message.clone()))
    }
}
