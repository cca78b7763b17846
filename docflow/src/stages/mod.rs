//! Stage trait and implementations.
//!
//! A stage transforms one document in place and may emit child documents.
//! Stages are composed into a [`crate::pipeline::Pipeline`].

mod builtin;
mod condition;
mod registry;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::document::Document;
use crate::errors::StageError;

pub use builtin::{DropDocumentStage, NoOpStage, SetStaticValuesStage};
pub use condition::{Condition, ConditionOperator};
pub use registry::{StageFactory, StageRegistry};

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Called once before the first document.
    async fn start(&self) -> Result<(), StageError> {
        Ok(())
    }

    /// Processes a document.
    ///
    /// The document may be mutated or marked as dropped. Returned documents
    /// are children that continue with the following stages only.
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError>;

    /// Called once after the last document.
    async fn stop(&self) -> Result<(), StageError> {
        Ok(())
    }
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&mut Document) -> Result<Vec<Document>, StageError> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut Document) -> Result<Vec<Document>, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut Document) -> Result<Vec<Document>, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut Document) -> Result<Vec<Document>, StageError> + Send + Sync,
{
    async fn process_document(&self, doc: &mut Document) -> Result<Vec<Document>, StageError> {
        (self.func)(doc)
    }
}
