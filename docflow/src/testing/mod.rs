//! Test doubles for stages, sinks and connectors.

mod connectors;
mod sinks;
mod stages;

pub use connectors::{FailingConnector, ListConnector};
pub use sinks::{FailingSink, RecordingSink};
pub use stages::{EmitChildrenStage, FailingStage, RecordingStage, SlowStage};
