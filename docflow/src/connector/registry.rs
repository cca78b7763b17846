//! Connector registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Connector, SequenceConnector};
use crate::config::ConnectorConfig;
use crate::errors::{ConfigError, ConnectorError};

/// Factory function type for creating connectors.
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Box<dyn Connector>, ConnectorError> + Send + Sync>;

/// Registry of connector factories keyed by type.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `sequence` connector.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sequence", |config| {
            Ok(Box::new(SequenceConnector::from_config(config)?) as Box<dyn Connector>)
        });
        registry
    }

    /// Registers a factory, replacing any previous one for the type.
    pub fn register<F>(&mut self, connector_type: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectorConfig) -> Result<Box<dyn Connector>, ConnectorError> + Send + Sync + 'static,
    {
        self.factories.insert(connector_type.into(), Arc::new(factory));
    }

    /// Checks whether a type is registered.
    #[must_use]
    pub fn contains(&self, connector_type: &str) -> bool {
        self.factories.contains_key(connector_type)
    }

    /// Builds the connector at 0-based `index` of the configured list. An
    /// unnamed connector is named `connector_N` after its 1-based position.
    pub fn create(&self, config: &ConnectorConfig, index: usize) -> Result<Box<dyn Connector>, ConfigError> {
        let factory = self
            .factories
            .get(&config.connector_type)
            .ok_or_else(|| ConfigError::UnknownConnectorType(config.connector_type.clone()))?;
        let mut resolved = config.clone();
        resolved.name = Some(config.resolved_name(index));
        factory(&resolved).map_err(|e| ConfigError::InvalidValue {
            field: format!("connectors[{index}]"),
            reason: e.to_string(),
        })
    }

    /// Builds every configured connector in order.
    pub fn create_all(&self, configs: &[ConnectorConfig]) -> Result<Vec<Arc<dyn Connector>>, ConfigError> {
        configs
            .iter()
            .enumerate()
            .map(|(index, config)| self.create(config, index).map(Arc::<dyn Connector>::from))
            .collect()
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("ConnectorRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_all_resolves_names() {
        let registry = ConnectorRegistry::with_builtins();
        let configs = vec![
            ConnectorConfig::new("sequence", "p").with_param("num_docs", json!(1)),
            ConnectorConfig::new("sequence", "p")
                .with_name("named")
                .with_param("num_docs", json!(1)),
        ];
        let connectors = registry.create_all(&configs).unwrap();
        let names: Vec<&str> = connectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["connector_1", "named"]);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let registry = ConnectorRegistry::with_builtins();
        let err = registry
            .create_all(&[ConnectorConfig::new("csv", "p")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConnectorType(t) if t == "csv"));
    }

    #[test]
    fn test_factory_errors_become_config_errors() {
        let registry = ConnectorRegistry::with_builtins();
        let err = registry
            .create_all(&[ConnectorConfig::new("sequence", "p")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
