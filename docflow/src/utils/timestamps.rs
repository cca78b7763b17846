//! Canonical instant formatting.
//!
//! Instants stored in documents and events are written as RFC 3339 UTC
//! strings with a `Z` suffix and only as many fractional digits as needed,
//! e.g. `2024-01-02T03:04:05Z` or `2024-01-02T03:04:05.120Z`.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Returns the current UTC time in canonical form.
#[must_use]
pub fn iso_timestamp() -> String {
    format_instant(&Utc::now())
}

/// Formats an instant canonically.
#[must_use]
pub fn format_instant(instant: &Timestamp) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an RFC 3339 instant, normalizing any offset to UTC.
pub fn parse_instant(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TimestampError::InvalidFormat(format!("{trimmed}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_drops_empty_fraction() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_instant(&instant), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let parsed = parse_instant("2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(format_instant(&parsed), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_round_trip_keeps_millis() {
        let instant = Utc.timestamp_millis_opt(1_700_000_000_120).unwrap();
        let text = format_instant(&instant);
        assert!(text.ends_with(".120Z"));
        assert_eq!(parse_instant(&text).unwrap(), instant);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_instant("  "), Err(TimestampError::EmptyString));
        assert!(matches!(
            parse_instant("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
    }
}
