//! Per-connector and per-run outcomes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::publisher::{CompletionStatus, PublisherStats};

/// How one connector's part of a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConnectorStatus {
    /// Every document reached a terminal state.
    Complete,
    /// The connector failed.
    Failed(String),
    /// Documents were still pending when the timeout elapsed.
    TimedOut,
}

impl From<CompletionStatus> for ConnectorStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Complete => Self::Complete,
            CompletionStatus::SourceFailed(reason) => Self::Failed(reason),
            CompletionStatus::TimedOut => Self::TimedOut,
        }
    }
}

/// Outcome of one connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorResult {
    /// Connector name.
    pub name: String,
    /// How it ended.
    pub status: ConnectorStatus,
    /// Document counters from its publisher.
    pub stats: PublisherStats,
    /// Wall-clock time from start to completion.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl ConnectorResult {
    /// Whether the connector completed.
    pub const fn is_complete(&self) -> bool {
        matches!(self.status, ConnectorStatus::Complete)
    }

    /// One-line human readable summary.
    pub fn message(&self) -> String {
        let outcome = match &self.status {
            ConnectorStatus::Complete => "complete",
            ConnectorStatus::Failed(_) => "failed",
            ConnectorStatus::TimedOut => "timed out",
        };
        let message = format!(
            "{}: {outcome}. {} docs succeeded. {} docs failed. {} docs dropped. Time: {:.2} secs.",
            self.name,
            self.stats.succeeded,
            self.stats.failed,
            self.stats.dropped,
            self.duration.as_secs_f64()
        );
        match &self.status {
            ConnectorStatus::Failed(reason) => format!("{message} Reason: {reason}"),
            _ => message,
        }
    }
}

impl fmt::Display for ConnectorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Run id.
    pub run_id: String,
    /// Results of the connectors that ran, in order.
    pub results: Vec<ConnectorResult>,
    /// Connectors skipped after a failure.
    pub skipped: Vec<String>,
}

impl RunResult {
    /// Number of connectors that completed.
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_complete()).count()
    }

    /// Number of connectors in the run.
    pub fn total(&self) -> usize {
        self.results.len() + self.skipped.len()
    }

    /// Whether every connector completed.
    pub fn is_success(&self) -> bool {
        self.completed() == self.total()
    }

    /// Documents delivered across all connectors.
    pub fn succeeded(&self) -> u64 {
        self.results.iter().map(|r| r.stats.succeeded).sum()
    }

    /// Documents failed across all connectors.
    pub fn failed(&self) -> u64 {
        self.results.iter().map(|r| r.stats.failed).sum()
    }

    /// Multi-line run summary.
    pub fn summary(&self) -> String {
        let verdict = if self.is_success() {
            "Success"
        } else if self.completed() > 0 {
            "Partial success"
        } else {
            "Failure"
        };
        let mut lines = vec![format!(
            "RUN SUMMARY: {verdict}. {}/{} connectors complete.",
            self.completed(),
            self.total()
        )];
        lines.extend(self.results.iter().map(ConnectorResult::message));
        lines.extend(self.skipped.iter().map(|name| format!("{name}: skipped.")));
        lines.join("\n")
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
