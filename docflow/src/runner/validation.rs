//! Configuration checks without running anything.
//!
//! [`validate_config`] builds every configured stage and connector and
//! collects all problems per pipeline and per connector, so one pass
//! reports everything that would stop a run.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::connector::ConnectorRegistry;
use crate::pipeline::PipelineBuilder;
use crate::stages::StageRegistry;

/// Problems found for one named pipeline or connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationEntry {
    /// Pipeline or connector name.
    pub name: String,
    /// Error messages; empty when the element is valid.
    pub errors: Vec<String>,
}

/// Outcome of validating a configuration, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// One entry per distinct pipeline name.
    pub pipelines: Vec<ValidationEntry>,
    /// One entry per distinct connector name.
    pub connectors: Vec<ValidationEntry>,
}

impl ValidationReport {
    /// Whether no problem was found.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    /// Total number of problems.
    pub fn error_count(&self) -> usize {
        self.pipelines
            .iter()
            .chain(&self.connectors)
            .map(|entry| entry.errors.len())
            .sum()
    }

    /// Problems of the named pipeline or connector.
    pub fn errors_for(&self, name: &str) -> &[String] {
        self.pipelines
            .iter()
            .chain(&self.connectors)
            .find(|entry| entry.name == name)
            .map_or(&[], |entry| entry.errors.as_slice())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Pipeline", &self.pipelines)?;
        writeln!(f)?;
        write_section(f, "Connector", &self.connectors)
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, kind: &str, entries: &[ValidationEntry]) -> fmt::Result {
    if entries.iter().all(|entry| entry.errors.is_empty()) {
        return write!(f, "{kind} configuration is valid");
    }
    write!(f, "{kind} configuration is invalid. Errors for each element:")?;
    for entry in entries {
        write!(f, "\n\t{kind}: {}\tError count: {}", entry.name, entry.errors.len())?;
        for (n, error) in entry.errors.iter().enumerate() {
            write!(f, "\n\t\tError {}: {error}", n + 1)?;
        }
    }
    Ok(())
}

/// Validates every pipeline and connector of `config`.
///
/// Pipelines are checked by building each stage through `stages`; a
/// repeated pipeline name adds an error to the first entry. Connectors are
/// checked by building them through `connectors` and by resolving their
/// pipeline; a repeated connector name is reported the same way.
pub fn validate_config(
    config: &EngineConfig,
    stages: &StageRegistry,
    connectors: &ConnectorRegistry,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for pipeline in &config.pipelines {
        if let Some(entry) = report.pipelines.iter_mut().find(|e| e.name == pipeline.name) {
            entry.errors.push("Another pipeline has the same name".to_string());
            continue;
        }
        report.pipelines.push(ValidationEntry {
            name: pipeline.name.clone(),
            errors: PipelineBuilder::validate_config(pipeline, stages)
                .iter()
                .map(ToString::to_string)
                .collect(),
        });
    }

    for (index, connector) in config.connectors.iter().enumerate() {
        let name = connector.resolved_name(index);
        if let Some(entry) = report.connectors.iter_mut().find(|e| e.name == name) {
            entry.errors.push("Another connector has the same name".to_string());
            continue;
        }
        let mut errors = Vec::new();
        if let Err(e) = connectors.create(connector, index) {
            errors.push(e.to_string());
        }
        if config.pipeline(&connector.pipeline).is_none() {
            errors.push(format!("Unknown pipeline '{}'", connector.pipeline));
        }
        report.connectors.push(ValidationEntry { name, errors });
    }

    if report.is_valid() {
        info!("{report}");
    } else {
        warn!(errors = report.error_count(), "{report}");
    }
    report
}
