//! Topic naming.

use serde::{Deserialize, Serialize};

/// Topic names derived from a pipeline name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNames {
    /// Documents waiting for the pipeline.
    pub source: String,
    /// Processed documents waiting for the indexer.
    pub destination: String,
    /// Messages that exhausted their retries.
    pub dead_letter: String,
    pipeline: String,
}

impl TopicNames {
    /// Derives the standard topic names for `pipeline`.
    pub fn for_pipeline(pipeline: impl Into<String>) -> Self {
        let pipeline = pipeline.into();
        Self {
            source: format!("{pipeline}_source"),
            destination: format!("{pipeline}_dest"),
            dead_letter: format!("{pipeline}_fail"),
            pipeline,
        }
    }

    /// Overrides the source topic.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Returns the pipeline name.
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Topic carrying the events of one run.
    pub fn events(&self, run_id: &str) -> String {
        format!("{}_event_{run_id}", self.pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names() {
        let topics = TopicNames::for_pipeline("web");
        assert_eq!(topics.source, "web_source");
        assert_eq!(topics.destination, "web_dest");
        assert_eq!(topics.dead_letter, "web_fail");
        assert_eq!(topics.events("r1"), "web_event_r1");
        assert_eq!(topics.with_source("raw").source, "raw");
    }
}
