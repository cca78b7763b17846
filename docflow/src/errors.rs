//! Error types for the docflow engine.
//!
//! Each concern has its own error enum; [`DocflowError`] aggregates them for
//! callers that drive a whole run.

use thiserror::Error;

/// The main error type for docflow operations.
#[derive(Debug, Error)]
pub enum DocflowError {
    /// A document could not be built, mutated or parsed.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// A pipeline could not be built or failed on a document.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// A queue operation failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// The coordination service failed.
    #[error("{0}")]
    Coordination(#[from] CoordinationError),

    /// A publisher operation failed.
    #[error("{0}")]
    Publisher(#[from] PublisherError),

    /// A worker loop stopped with an error.
    #[error("{0}")]
    Worker(#[from] WorkerError),

    /// An indexer loop stopped with an error.
    #[error("{0}")]
    Indexer(#[from] IndexerError),

    /// A connector failed.
    #[error("{0}")]
    Connector(#[from] ConnectorError),

    /// Configuration was invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A run could not be set up.
    #[error("{0}")]
    Run(#[from] RunError),
}

/// Errors raised by the document model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Documents must carry a non-empty id.
    #[error("Document id must be a non-empty string")]
    EmptyId,

    /// A reserved field was targeted by a generic field operation.
    #[error("Field '{0}' is reserved and cannot be modified directly")]
    ReservedField(String),

    /// The run id of a document can be set only once.
    #[error("Document '{0}' already has a run id")]
    RunIdAlreadySet(String),

    /// A nested path string could not be parsed.
    #[error("Invalid nested path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An array write targeted an index past the end of the array.
    #[error("Index {index} is out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Current array length.
        len: usize,
    },

    /// A nested write went through a value that is not an object or array.
    #[error("Cannot descend into non-container value at '{0}'")]
    NotAContainer(String),

    /// The wire form was malformed.
    #[error("Malformed document: {0}")]
    Malformed(String),
}

impl DocumentError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// An error raised by a single stage while processing a document.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage failed on the document.
    #[error("{0}")]
    Failed(String),

    /// A document operation inside the stage failed.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// The stage configuration was invalid.
    #[error("Invalid stage configuration: {0}")]
    Config(String),
}

impl StageError {
    /// Creates a processing failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors raised while building or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed on a document; the remaining stages were not run.
    #[error("Stage '{stage}' failed on document '{doc_id}': {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// Id of the document being processed.
        doc_id: String,
        /// Underlying stage error.
        #[source]
        source: StageError,
    },

    /// Two stages share a name.
    #[error("Pipeline '{pipeline}' contains duplicate stage name '{stage}'")]
    DuplicateStage {
        /// Pipeline name.
        pipeline: String,
        /// Duplicated stage name.
        stage: String,
    },

    /// A stage type is not registered.
    #[error("Unknown stage type '{0}'")]
    UnknownStageType(String),

    /// A stage factory rejected its configuration.
    #[error("Failed to build stage '{stage}': {source}")]
    Build {
        /// Stage name.
        stage: String,
        /// Underlying error.
        #[source]
        source: StageError,
    },

    /// A stage start or stop hook failed.
    #[error("Lifecycle hook of stage '{stage}' failed: {source}")]
    Lifecycle {
        /// Stage name.
        stage: String,
        /// Underlying error.
        #[source]
        source: StageError,
    },
}

/// Errors raised at the queue boundary.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker rejected or failed a send.
    #[error("Failed to send to topic '{topic}': {reason}")]
    Send {
        /// Target topic.
        topic: String,
        /// Failure reason.
        reason: String,
    },

    /// Polling failed.
    #[error("Failed to poll topic '{topic}': {reason}")]
    Poll {
        /// Source topic.
        topic: String,
        /// Failure reason.
        reason: String,
    },

    /// Committing offsets failed.
    #[error("Failed to commit offsets: {0}")]
    Commit(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the coordination service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// The service could not be reached. Retried with backoff.
    #[error("Coordination service unavailable: {0}")]
    Unavailable(String),

    /// A compare-and-set loop kept losing to concurrent writers.
    #[error("Gave up updating counter '{key}' after {attempts} attempts")]
    Contention {
        /// Counter key.
        key: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl CoordinationError {
    /// Whether the call may succeed if repeated.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// An error raised by a destination sink for a whole batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SinkError {
    /// Description of the failure.
    pub message: String,
}

impl SinkError {
    /// Creates a new sink error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by connectors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The connector failed while producing documents.
    #[error("Connector '{connector}' failed: {reason}")]
    Execution {
        /// Connector name.
        connector: String,
        /// Failure reason.
        reason: String,
    },

    /// The connector configuration was invalid.
    #[error("Invalid connector configuration: {0}")]
    Config(String),

    /// Publishing a document failed.
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Errors raised by the publisher.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The document could not be stamped with the run id.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// Sending or polling failed.
    #[error("{0}")]
    Queue(#[from] QueueError),
}

/// Errors that stop a worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Retry accounting is impossible without the coordination service.
    #[error("Retry counter unavailable: {0}")]
    Coordination(#[from] CoordinationError),

    /// The queue failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// The worker was misconfigured.
    #[error("Invalid worker configuration: {0}")]
    Config(String),
}

/// Errors that stop an indexer loop.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The queue failed.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// Closing the sink failed.
    #[error("Failed to close sink: {0}")]
    Close(#[from] SinkError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The content was not valid configuration.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two connectors share a name.
    #[error("Duplicate connector name '{0}'")]
    DuplicateConnector(String),

    /// A connector type is not registered.
    #[error("Unknown connector type '{0}'")]
    UnknownConnectorType(String),

    /// A connector names a pipeline that is not configured.
    #[error("Connector '{connector}' references unknown pipeline '{pipeline}'")]
    UnknownPipeline {
        /// Connector name.
        connector: String,
        /// Missing pipeline name.
        pipeline: String,
    },

    /// A value was out of range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Config key.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised while setting up or tearing down a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A pipeline needed by a connector is missing.
    #[error("No pipeline named '{0}' is available")]
    MissingPipeline(String),

    /// The publisher could not be created.
    #[error("{0}")]
    Publisher(#[from] PublisherError),

    /// A background worker or indexer failed.
    #[error("{0}")]
    Worker(#[from] WorkerError),

    /// A background indexer failed.
    #[error("{0}")]
    Indexer(#[from] IndexerError),

    /// Stage lifecycle hooks failed.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display_includes_context() {
        let err = PipelineError::Stage {
            stage: "stage_2".to_string(),
            doc_id: "doc1".to_string(),
            source: StageError::failed("boom"),
        };
        assert_eq!(
            err.to_string(),
            "Stage 'stage_2' failed on document 'doc1': boom"
        );
    }

    #[test]
    fn test_only_unavailability_is_transient() {
        assert!(CoordinationError::Unavailable("down".into()).is_transient());
        assert!(!CoordinationError::Contention {
            key: "k".into(),
            attempts: 3
        }
        .is_transient());
    }

    #[test]
    fn test_docflow_error_from_document_error() {
        let err: DocflowError = DocumentError::EmptyId.into();
        assert!(matches!(err, DocflowError::Document(DocumentError::EmptyId)));
    }
}
