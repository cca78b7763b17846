//! # Docflow
//!
//! An execution and completion-tracking engine for document ingestion.
//!
//! Connectors publish documents for a run. Worker loops take them from a
//! partitioned queue, run them through a pipeline of stages and forward the
//! results; indexers batch the results into a destination sink. Every step
//! reports CREATE, FINISH, FAIL or DROP events, and a run is complete only
//! when every document it produced, children included, has reached a
//! terminal state.
//!
//! - **Documents**: identified records with single or multi-valued fields,
//!   nested path access and attachable children
//! - **Pipelines**: ordered stages where children continue with later stages
//! - **Completion tracking**: a publisher that reconciles unordered events
//! - **At-least-once delivery**: per-message retry counters and dead letters
//! - **Windowed batching**: size and time bounded delivery to sinks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::prelude::*;
//!
//! let config = EngineConfig::from_file("docflow.json")?;
//! let sink = Arc::new(LoggingSink::new());
//! let result = run_local(
//!     &config,
//!     &StageRegistry::with_builtins(),
//!     &ConnectorRegistry::with_builtins(),
//!     sink,
//! )
//! .await?;
//! println!("{}", result.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod config;
pub mod connector;
pub mod coordination;
pub mod core;
pub mod document;
pub mod errors;
pub mod indexer;
pub mod lifecycle;
pub mod messaging;
pub mod observability;
pub mod pipeline;
pub mod publisher;
pub mod runner;
pub mod stages;
pub mod testing;
pub mod utils;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::Batch;
    pub use crate::config::{
        ConnectorConfig, EngineConfig, IndexerConfig, PipelineConfig, RunnerConfig,
        StageConfig, WorkerConfig,
    };
    pub use crate::connector::{Connector, ConnectorRegistry};
    pub use crate::coordination::{InMemoryCounterStore, RetryCounterStore};
    pub use crate::core::{Event, EventType};
    pub use crate::document::{Document, Segment, UpdateMode};
    pub use crate::errors::{DocflowError, DocumentError, StageError};
    pub use crate::indexer::{Indexer, IndexerSink, LoggingSink};
    pub use crate::lifecycle::ShutdownSignal;
    pub use crate::messaging::{MemoryBroker, QueueConsumer, QueueProducer, TopicNames};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineResult};
    pub use crate::publisher::{CompletionStatus, Publisher};
    pub use crate::runner::{run_local, validate_config, RunResult, Runner, ValidationReport};
    pub use crate::stages::{Stage, StageRegistry};
    pub use crate::worker::Worker;
    pub use std::sync::Arc;
}
