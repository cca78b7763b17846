//! End-to-end runs over the in-memory environment.

#[cfg(test)]
mod tests {
    use crate::config::{ConnectorConfig, EngineConfig, PipelineConfig, RunnerConfig, StageConfig};
    use crate::connector::{Connector, ConnectorRegistry};
    use crate::runner::{run_local, ConnectorStatus, LocalEnvironment, Runner};
    use crate::stages::{Stage, StageRegistry};
    use crate::testing::{EmitChildrenStage, FailingConnector, FailingStage, ListConnector, RecordingSink};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn stages() -> StageRegistry {
        let mut registry = StageRegistry::with_builtins();
        registry.register("emit_children", |config| {
            let count = config.param::<usize>("count").ok().flatten().unwrap_or(1);
            Ok(Arc::new(EmitChildrenStage::new(count)) as Arc<dyn Stage>)
        });
        registry.register("fail", |_| Ok(Arc::new(FailingStage::new("stage exploded")) as Arc<dyn Stage>));
        registry
    }

    fn base_config(stages: Vec<StageConfig>, num_docs: u64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.runner = RunnerConfig {
            event_poll_ms: 5,
            ..RunnerConfig::default()
        }
        .with_connector_timeout(Some(Duration::from_secs(10)));
        config.worker.poll_timeout_ms = 5;
        config.indexer.poll_timeout_ms = 5;
        config.indexer.batch_timeout_ms = 10;
        config.coordination.base_delay_ms = 1;
        config.pipelines = vec![PipelineConfig {
            name: "p".to_string(),
            stages,
        }];
        config.connectors = vec![ConnectorConfig::new("sequence", "p")
            .with_name("seq")
            .with_param("num_docs", json!(num_docs))
            .with_param("id_prefix", json!("doc-"))];
        config
    }

    #[tokio::test]
    async fn test_one_document_with_two_children_is_fully_indexed() {
        let config = base_config(
            vec![StageConfig::new("emit_children").with_param("count", json!(2))],
            1,
        );
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink.clone())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 0);
        let mut ids = sink.ids();
        ids.sort();
        assert_eq!(ids, vec!["doc-1", "doc-1-child-1", "doc-1-child-2"]);
        assert!(sink.is_closed());
        assert!(result
            .summary()
            .starts_with("RUN SUMMARY: Success. 1/1 connectors complete.\nseq: complete. 3 docs succeeded. 0 docs failed. 0 docs dropped."));
    }

    #[tokio::test]
    async fn test_dropped_documents_settle_the_run() {
        let config = base_config(vec![StageConfig::new("drop_document")], 2);
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink.clone())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.results[0].stats.dropped, 2);
        assert!(sink.ids().is_empty());
    }

    #[tokio::test]
    async fn test_stage_failures_count_as_failed_documents() {
        let config = base_config(vec![StageConfig::new("fail")], 2);
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.failed(), 2);
        assert_eq!(result.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_retried_failures_end_in_dead_letter() {
        let mut config = base_config(vec![StageConfig::new("fail")], 1);
        config.worker.max_retries = Some(1);
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.failed(), 1);
    }

    #[tokio::test]
    async fn test_connectors_run_in_order_and_reuse_pipelines() {
        let mut config = base_config(vec![StageConfig::new("noop")], 1);
        config.connectors.push(
            ConnectorConfig::new("sequence", "p")
                .with_param("num_docs", json!(2))
                .with_param("id_prefix", json!("second-")),
        );
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink.clone())
            .await
            .unwrap();

        let names: Vec<&str> = result.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["seq", "connector_2"]);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(sink.ids().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_connector_skips_the_rest() {
        let runner = Runner::new(Arc::new(LocalEnvironment::default()), RunnerConfig::default()).with_run_id("r1");
        let connectors: Vec<Arc<dyn Connector>> = vec![
            Arc::new(FailingConnector::new("first", "p", "unreachable")),
            Arc::new(ListConnector::new("second", "p", ["a"])),
        ];

        let result = runner.run(connectors).await.unwrap();

        assert_eq!(result.run_id, "r1");
        assert!(matches!(result.results[0].status, ConnectorStatus::Failed(_)));
        assert_eq!(result.skipped, vec!["second"]);
        assert!(result.summary().starts_with("RUN SUMMARY: Failure. 0/2 connectors complete."));
        assert!(result.summary().ends_with("second: skipped."));
    }

    #[tokio::test]
    async fn test_connector_times_out_without_workers() {
        let config = RunnerConfig {
            event_poll_ms: 5,
            ..RunnerConfig::default()
        }
        .with_connector_timeout(Some(Duration::from_millis(50)));
        let runner = Runner::new(Arc::new(LocalEnvironment::default()), config);
        let connector: Arc<dyn Connector> = Arc::new(ListConnector::new("list", "p", ["a"]));

        let result = runner.run_connector(connector).await.unwrap();

        assert_eq!(result.status, ConnectorStatus::TimedOut);
        assert_eq!(result.stats.pending, 1);
    }

    #[tokio::test]
    async fn test_pending_limit_throttles_without_stalling() {
        let mut config = base_config(vec![StageConfig::new("emit_children").with_param("count", json!(1))], 5);
        config.runner.max_pending_docs = Some(1);
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink.clone())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.succeeded(), 10);
        assert_eq!(result.results[0].stats.published, 5);
    }

    #[tokio::test]
    async fn test_collapsing_connector_publishes_merged_documents() {
        let mut config = base_config(vec![StageConfig::new("noop")], 1);
        config.connectors = vec![ConnectorConfig::new("list", "p").with_name("list")];
        let mut connectors = ConnectorRegistry::new();
        connectors.register("list", |config| {
            let name = config.name.clone().unwrap_or_default();
            Ok(Box::new(ListConnector::new(name, &config.pipeline, ["a", "a", "b"]).collapsing()) as Box<dyn Connector>)
        });
        let sink = Arc::new(RecordingSink::new());

        let result = run_local(&config, &stages(), &connectors, sink.clone()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.results[0].stats.published, 2);
        let mut ids = sink.ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_fails_before_running() {
        let mut config = base_config(vec![], 1);
        config.connectors[0].pipeline = "missing".to_string();
        let sink = Arc::new(RecordingSink::new());

        let err = run_local(&config, &stages(), &ConnectorRegistry::with_builtins(), sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
