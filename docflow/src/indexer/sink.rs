//! Destination boundary.

use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::document::Document;
use crate::errors::SinkError;

/// Delivers batches of documents to a destination.
///
/// A call either delivers the whole batch or fails for all of it.
#[async_trait]
pub trait IndexerSink: Send + Sync + Debug {
    /// Delivers a non-empty batch.
    async fn send(&self, documents: &[Document]) -> Result<(), SinkError>;

    /// Releases destination resources.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that logs each batch and keeps the ids it was given.
#[derive(Debug, Default)]
pub struct LoggingSink {
    delivered: Mutex<Vec<String>>,
}

impl LoggingSink {
    /// Creates a new logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids delivered so far.
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl IndexerSink for LoggingSink {
    async fn send(&self, documents: &[Document]) -> Result<(), SinkError> {
        info!(count = documents.len(), "Delivering batch");
        self.delivered
            .lock()
            .extend(documents.iter().map(|d| d.id().to_string()));
        Ok(())
    }
}
