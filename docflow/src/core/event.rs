//! Document lifecycle events.
//!
//! Workers and indexers report what happened to each document on the run's
//! event topic; the publisher consumes those events to decide when a run is
//! complete. No ordering is guaranteed between the CREATE and the terminal
//! event of the same document.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::QueueError;
use crate::utils::Timestamp;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A stage created the document as a child.
    Create,
    /// The document was delivered to the destination.
    Finish,
    /// The document failed permanently.
    Fail,
    /// A stage dropped the document.
    Drop,
}

impl EventType {
    /// Whether this event ends the tracking of a document.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Create)
    }

    /// Returns the wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Finish => "FINISH",
            Self::Fail => "FAIL",
            Self::Drop => "DROP",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification about one document within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Id of the document concerned.
    pub document_id: String,
    /// Run the document belongs to.
    pub run_id: String,
    /// Optional detail, e.g. an error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// What happened.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// When it happened.
    pub instant: Timestamp,
}

impl Event {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(document_id: impl Into<String>, run_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            document_id: document_id.into(),
            run_id: run_id.into(),
            message: None,
            event_type,
            instant: chrono::Utc::now(),
        }
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether this event ends the tracking of its document.
    pub const fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    /// Encodes the event as a queue payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, QueueError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an event from a queue payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, QueueError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (run {})", self.event_type, self.document_id, self.run_id)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_terminal_types() {
        assert!(!EventType::Create.is_terminal());
        assert!(EventType::Finish.is_terminal());
        assert!(EventType::Fail.is_terminal());
        assert!(EventType::Drop.is_terminal());
    }

    #[test]
    fn test_wire_form_uses_camel_case_and_upper_types() {
        let event = Event::new("doc1", "run1", EventType::Fail).with_message("SENT_TO_DLQ");
        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(json["documentId"], "doc1");
        assert_eq!(json["runId"], "run1");
        assert_eq!(json["type"], "FAIL");
        assert_eq!(json["message"], "SENT_TO_DLQ");
        assert_eq!(Event::from_slice(&event.to_bytes().unwrap()).unwrap(), event);
    }

    #[test]
    fn test_display() {
        let event = Event::new("d", "r", EventType::Finish);
        assert_eq!(event.to_string(), "FINISH d (run r)");
    }
}
