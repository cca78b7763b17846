//! Per-stage document conditions.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Whether a matching value requires or forbids running the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Run only if some field holds one of the values.
    #[default]
    Must,
    /// Run only if no field holds any of the values.
    MustNot,
}

/// A test deciding whether a stage applies to a document.
///
/// The condition matches when any listed field holds any listed value,
/// compared as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Fields to inspect.
    pub fields: Vec<String>,
    /// Values to look for.
    pub values: Vec<String>,
    /// How a match is interpreted.
    #[serde(default)]
    pub operator: ConditionOperator,
}

impl Condition {
    /// A condition that requires one of `values` in one of `fields`.
    pub fn must<F, V>(fields: F, values: V) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
            operator: ConditionOperator::Must,
        }
    }

    /// Inverts the operator.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.operator = match self.operator {
            ConditionOperator::Must => ConditionOperator::MustNot,
            ConditionOperator::MustNot => ConditionOperator::Must,
        };
        self
    }

    /// Whether the stage should run on `doc`.
    pub fn test(&self, doc: &Document) -> bool {
        let found = self.fields.iter().any(|field| {
            doc.get_string_list(field)
                .is_some_and(|stored| stored.iter().any(|v| self.values.contains(v)))
        });
        match self.operator {
            ConditionOperator::Must => found,
            ConditionOperator::MustNot => !found,
        }
    }
}
