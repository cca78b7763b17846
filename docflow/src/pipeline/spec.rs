//! Stage specifications.

use std::sync::Arc;

use crate::document::Document;
use crate::stages::{Condition, Stage};

/// A named stage within a pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Conditions that must all hold for the stage to run.
    pub conditions: Vec<Condition>,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            conditions: Vec::new(),
        }
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Replaces the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Whether the stage should run on `doc`.
    pub fn applies_to(&self, doc: &Document) -> bool {
        !doc.is_dropped() && self.conditions.iter().all(|c| c.test(doc))
    }
}
