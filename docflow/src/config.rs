//! Engine configuration.
//!
//! Configuration is plain JSON deserialized into the structs below. Every
//! section has defaults, so an empty object is a valid configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::RESERVED_FIELDS;
use crate::errors::ConfigError;
use crate::stages::Condition;

/// Top level configuration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connector sequencing and completion waiting.
    pub runner: RunnerConfig,
    /// Pipeline worker loops.
    pub worker: WorkerConfig,
    /// Indexer loops.
    pub indexer: IndexerConfig,
    /// Coordination service client.
    pub coordination: CoordinationConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Pipeline definitions.
    pub pipelines: Vec<PipelineConfig>,
    /// Connectors, run in order.
    pub connectors: Vec<ConnectorConfig>,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Checks cross-section consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (index, connector) in self.connectors.iter().enumerate() {
            let name = connector.resolved_name(index);
            if !names.insert(name.clone()) {
                return Err(ConfigError::DuplicateConnector(name));
            }
            if self.pipeline(&connector.pipeline).is_none() {
                return Err(ConfigError::UnknownPipeline {
                    connector: name,
                    pipeline: connector.pipeline.clone(),
                });
            }
        }
        if self.indexer.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "indexer.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(field) = self
            .indexer
            .ignore_fields
            .iter()
            .find(|f| RESERVED_FIELDS.contains(&f.as_str()))
        {
            return Err(ConfigError::InvalidValue {
                field: "indexer.ignore_fields".to_string(),
                reason: format!("'{field}' is reserved"),
            });
        }
        if self.runner.max_pending_docs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "runner.max_pending_docs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.coordination.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "coordination.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Looks up a pipeline by name.
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}

/// Settings for running connectors and waiting on their documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// How long one connector's documents may take; `null` waits forever.
    pub connector_timeout_ms: Option<u64>,
    /// Event poll timeout while waiting for completion.
    pub event_poll_ms: u64,
    /// Interval between progress log lines.
    pub log_seconds: u64,
    /// Pending documents at which `publish` waits; `null` never waits.
    pub max_pending_docs: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            connector_timeout_ms: Some(24 * 60 * 60 * 1000),
            event_poll_ms: 50,
            log_seconds: 5,
            max_pending_docs: None,
        }
    }
}

impl RunnerConfig {
    /// Sets the connector timeout.
    #[must_use]
    pub fn with_connector_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connector_timeout_ms = timeout.map(duration_ms);
        self
    }

    /// Sets the pending limit of publishers.
    #[must_use]
    pub const fn with_max_pending_docs(mut self, max: Option<usize>) -> Self {
        self.max_pending_docs = max;
        self
    }

    /// Returns the connector timeout.
    pub fn connector_timeout(&self) -> Option<Duration> {
        self.connector_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the event poll timeout.
    pub const fn event_poll(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    /// Returns the progress log interval.
    pub const fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_seconds)
    }
}

/// Settings for pipeline worker loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Consumer group of the source topic.
    pub consumer_group: String,
    /// Deliveries allowed before a message is dead-lettered. Retry tracking
    /// is off when unset.
    pub max_retries: Option<u64>,
    /// Source poll timeout.
    pub poll_timeout_ms: u64,
    /// Longest allowed gap between polls before the watchdog fires.
    pub max_processing_secs: u64,
    /// Whether the watchdog terminates the process.
    pub exit_on_timeout: bool,
    /// How often the watchdog checks.
    pub watchdog_period_ms: u64,
    /// Whether exhausted messages are copied to the dead-letter topic.
    pub dead_letter: bool,
    /// Worker loops per pipeline in local mode.
    pub num_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_group: "docflow_workers".to_string(),
            max_retries: None,
            poll_timeout_ms: 50,
            max_processing_secs: 600,
            exit_on_timeout: false,
            watchdog_period_ms: 1000,
            dead_letter: true,
            num_workers: 1,
        }
    }
}

impl WorkerConfig {
    /// Enables retry tracking.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the watchdog limit.
    #[must_use]
    pub const fn with_max_processing_secs(mut self, secs: u64) -> Self {
        self.max_processing_secs = secs;
        self
    }

    /// Returns the source poll timeout.
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Returns the watchdog limit.
    pub const fn max_processing(&self) -> Duration {
        Duration::from_secs(self.max_processing_secs)
    }

    /// Returns the watchdog period.
    pub const fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }
}

/// Settings for indexer loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Consumer group of the destination topic.
    pub consumer_group: String,
    /// Documents per sink call.
    pub batch_size: usize,
    /// Batch window.
    pub batch_timeout_ms: u64,
    /// Destination poll timeout.
    pub poll_timeout_ms: u64,
    /// Indexer loops per pipeline in local mode.
    pub num_indexers: usize,
    /// Fields removed from documents before they reach the sink.
    pub ignore_fields: Vec<String>,
    /// Field whose value, when present, replaces the id seen by the sink.
    pub id_override_field: Option<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            consumer_group: "docflow_indexers".to_string(),
            batch_size: crate::batch::DEFAULT_BATCH_SIZE,
            batch_timeout_ms: 100,
            poll_timeout_ms: 50,
            num_indexers: 1,
            ignore_fields: Vec::new(),
            id_override_field: None,
        }
    }
}

impl IndexerConfig {
    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the batch window.
    #[must_use]
    pub const fn with_batch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.batch_timeout_ms = timeout_ms;
        self
    }

    /// Sets the fields stripped before delivery.
    #[must_use]
    pub fn with_ignore_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ignore_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the field overriding the delivered id.
    #[must_use]
    pub fn with_id_override_field(mut self, field: impl Into<String>) -> Self {
        self.id_override_field = Some(field.into());
        self
    }

    /// Returns the batch window.
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Returns the destination poll timeout.
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Retry policy for coordination service calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on a single delay.
    pub max_delay_ms: u64,
    /// Whether delays are randomized.
    pub jitter: bool,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A named pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, also used to derive topic names.
    pub name: String,
    /// Stages in order.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Creates a pipeline definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }
}

/// One stage of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registered stage type.
    #[serde(rename = "type")]
    pub stage_type: String,
    /// Stage name; defaults to `stage_N`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Conditions that must all hold for the stage to run on a document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Stage specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl StageConfig {
    /// Creates a stage definition of the given type.
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            stage_type: stage_type.into(),
            name: None,
            conditions: Vec::new(),
            params: Map::new(),
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Deserializes a parameter, if present.
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        read_param(&self.params, key)
    }
}

/// One connector of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Registered connector type.
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Connector name; defaults to `connector_N`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pipeline that processes this connector's documents.
    pub pipeline: String,
    /// Connector specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ConnectorConfig {
    /// Creates a connector definition.
    pub fn new(connector_type: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            name: None,
            pipeline: pipeline.into(),
            params: Map::new(),
        }
    }

    /// Sets the connector name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Returns the configured name or `connector_N` for the zero-based
    /// position `index`.
    pub fn resolved_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("connector_{}", index + 1))
    }

    /// Deserializes a parameter, if present.
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        read_param(&self.params, key)
    }
}

fn read_param<T: DeserializeOwned>(
    params: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, serde_json::Error> {
    params
        .get(key)
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "worker": {"max_retries": 2, "consumer_group": "g1"},
        "indexer": {"batch_size": 10},
        "pipelines": [
            {"name": "p1", "stages": [
                {"type": "noop"},
                {"type": "set_static_values", "name": "tag", "fields": {"source": "web"},
                 "conditions": [{"fields": ["kind"], "values": ["page"]}]}
            ]}
        ],
        "connectors": [
            {"type": "sequence", "pipeline": "p1", "num_docs": 3},
            {"type": "sequence", "name": "second", "pipeline": "p1"}
        ]
    }"#;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.worker.max_retries, None);
        assert_eq!(config.indexer.batch_size, 100);
        assert_eq!(config.runner.connector_timeout(), Some(Duration::from_secs(86_400)));
        assert_eq!(config.runner.event_poll(), Duration::from_millis(50));
        assert!(config.connectors.is_empty());
    }

    #[test]
    fn test_sample_config() {
        let config = EngineConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.worker.max_retries, Some(2));
        assert_eq!(config.worker.consumer_group, "g1");
        assert_eq!(config.worker.poll_timeout_ms, 50);
        assert_eq!(config.indexer.batch_size, 10);

        let pipeline = config.pipeline("p1").unwrap();
        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.stages[1].name.as_deref(), Some("tag"));
        assert_eq!(pipeline.stages[1].conditions.len(), 1);
        let fields: Map<String, Value> = pipeline.stages[1].param("fields").unwrap().unwrap();
        assert_eq!(fields["source"], "web");

        assert_eq!(config.connectors[0].resolved_name(0), "connector_1");
        assert_eq!(config.connectors[1].resolved_name(1), "second");
        assert_eq!(config.connectors[0].param::<u64>("num_docs").unwrap(), Some(3));
    }

    #[test]
    fn test_null_timeout_disables_it() {
        let config = EngineConfig::from_json_str(r#"{"runner": {"connector_timeout_ms": null}}"#).unwrap();
        assert_eq!(config.runner.connector_timeout(), None);
    }

    #[test]
    fn test_duplicate_connector_names_rejected() {
        let input = r#"{
            "pipelines": [{"name": "p"}],
            "connectors": [
                {"type": "sequence", "name": "connector_2", "pipeline": "p"},
                {"type": "sequence", "pipeline": "p"}
            ]
        }"#;
        assert!(matches!(
            EngineConfig::from_json_str(input),
            Err(ConfigError::DuplicateConnector(name)) if name == "connector_2"
        ));
    }

    #[test]
    fn test_unknown_pipeline_rejected() {
        let input = r#"{"connectors": [{"type": "sequence", "pipeline": "nope"}]}"#;
        assert!(matches!(
            EngineConfig::from_json_str(input),
            Err(ConfigError::UnknownPipeline { .. })
        ));
    }

    #[test]
    fn test_indexer_and_publisher_options() {
        let input = r#"{
            "runner": {"max_pending_docs": 50},
            "indexer": {"ignore_fields": ["raw"], "id_override_field": "external_id"}
        }"#;
        let config = EngineConfig::from_json_str(input).unwrap();
        assert_eq!(config.runner.max_pending_docs, Some(50));
        assert_eq!(config.indexer.ignore_fields, vec!["raw"]);
        assert_eq!(config.indexer.id_override_field.as_deref(), Some("external_id"));

        assert!(matches!(
            EngineConfig::from_json_str(r#"{"indexer": {"ignore_fields": ["id"]}}"#),
            Err(ConfigError::InvalidValue { field, .. }) if field == "indexer.ignore_fields"
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"runner": {"max_pending_docs": 0}}"#),
            Err(ConfigError::InvalidValue { field, .. }) if field == "runner.max_pending_docs"
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.connectors.len(), 2);

        assert!(matches!(
            EngineConfig::from_file(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
