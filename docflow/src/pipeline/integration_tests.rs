//! Tests for pipeline execution and child document routing.

#[cfg(test)]
mod tests {
    use crate::document::Document;
    use crate::errors::PipelineError;
    use crate::pipeline::{PipelineBuilder, StageSpec};
    use crate::stages::{Condition, DropDocumentStage, NoOpStage};
    use crate::testing::{EmitChildrenStage, FailingStage, RecordingStage};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn doc(id: &str) -> Document {
        Document::with_run_id(id, "run1").unwrap()
    }

    #[tokio::test]
    async fn test_child_skips_emitting_stage() {
        let first = Arc::new(RecordingStage::new());
        let third = Arc::new(RecordingStage::new());
        let pipeline = PipelineBuilder::new("p")
            .stage(first.clone())
            .unwrap()
            .stage(Arc::new(EmitChildrenStage::new(1)))
            .unwrap()
            .stage(third.clone())
            .unwrap()
            .build();

        let result = pipeline.process(doc("d1")).await.unwrap();

        let ids: Vec<&str> = result.documents.iter().map(Document::id).collect();
        assert_eq!(ids, vec!["d1", "d1-child-1"]);
        assert!(result.dropped.is_empty());
        assert_eq!(first.seen(), vec!["d1"]);
        assert_eq!(third.seen(), vec!["d1", "d1-child-1"]);
    }

    #[tokio::test]
    async fn test_children_inherit_run_id() {
        let pipeline = PipelineBuilder::new("p")
            .stage(Arc::new(EmitChildrenStage::new(2)))
            .unwrap()
            .build();

        let result = pipeline.process(doc("d1")).await.unwrap();
        assert_eq!(result.documents.len(), 3);
        assert!(result.documents.iter().all(|d| d.run_id() == Some("run1")));
    }

    #[tokio::test]
    async fn test_grandchildren_follow_later_stages_only() {
        let last = Arc::new(RecordingStage::new());
        let pipeline = PipelineBuilder::new("p")
            .stage(Arc::new(EmitChildrenStage::new(1)))
            .unwrap()
            .stage(Arc::new(EmitChildrenStage::new(1)))
            .unwrap()
            .stage(last.clone())
            .unwrap()
            .build();

        let result = pipeline.process(doc("d")).await.unwrap();
        let ids: Vec<&str> = result.documents.iter().map(Document::id).collect();
        assert_eq!(ids, vec!["d", "d-child-1", "d-child-1", "d-child-1-child-1"]);
        assert_eq!(last.seen().len(), 4);
    }

    #[tokio::test]
    async fn test_dropped_documents_are_separated_and_skip_later_stages() {
        let after = Arc::new(RecordingStage::new());
        let mut builder = PipelineBuilder::new("p")
            .stage(Arc::new(EmitChildrenStage::new(2)))
            .unwrap();
        builder
            .add_stage_spec(
                StageSpec::new("drop_second", Arc::new(DropDocumentStage))
                    .with_condition(Condition::must(["child_index"], ["2"])),
            )
            .unwrap();
        let pipeline = builder.stage(after.clone()).unwrap().build();

        let result = pipeline.process(doc("d")).await.unwrap();
        let kept: Vec<&str> = result.documents.iter().map(Document::id).collect();
        let dropped: Vec<&str> = result.dropped.iter().map(Document::id).collect();
        assert_eq!(kept, vec!["d", "d-child-1"]);
        assert_eq!(dropped, vec!["d-child-2"]);
        assert_eq!(after.seen(), vec!["d", "d-child-1"]);
    }

    #[tokio::test]
    async fn test_stage_failure_aborts_document() {
        let after = Arc::new(RecordingStage::new());
        let pipeline = PipelineBuilder::new("p")
            .stage(Arc::new(NoOpStage::new()))
            .unwrap()
            .named_stage("breaker", Arc::new(FailingStage::new("bad input")))
            .unwrap()
            .stage(after.clone())
            .unwrap()
            .build();

        let err = pipeline.process(doc("d1")).await.unwrap_err();
        assert!(matches!(
            &err,
            PipelineError::Stage { stage, doc_id, .. } if stage == "breaker" && doc_id == "d1"
        ));
        assert!(after.seen().is_empty());

        let metrics = pipeline.metrics();
        assert_eq!(metrics[0].processed, 1);
        assert_eq!(metrics[1].errors, 1);
        assert_eq!(metrics[2].processed, 0);
    }

    #[tokio::test]
    async fn test_failure_on_child_aborts_input() {
        let pipeline = PipelineBuilder::new("p")
            .stage(Arc::new(EmitChildrenStage::new(1)))
            .unwrap()
            .stage(Arc::new(FailingStage::new("child rejected").only_for("d1-child-1")))
            .unwrap()
            .build();

        assert!(pipeline.process(doc("d1")).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_input() {
        let pipeline = PipelineBuilder::new("p").build();
        let result = pipeline.process(doc("d1")).await.unwrap();
        assert_eq!(result.documents, vec![doc("d1")]);
    }

    #[tokio::test]
    async fn test_metrics_count_skips() {
        let mut builder = PipelineBuilder::new("p");
        builder
            .add_stage_spec(
                StageSpec::new("only_pdf", Arc::new(NoOpStage::new()))
                    .with_condition(Condition::must(["type"], ["pdf"])),
            )
            .unwrap();
        let pipeline = builder.build();
        pipeline.process(doc("a")).await.unwrap();
        pipeline.process(doc("b")).await.unwrap();

        let metrics = pipeline.metrics();
        assert_eq!(metrics[0].skipped, 2);
        assert_eq!(metrics[0].processed, 0);
        pipeline.log_metrics();
    }
}
