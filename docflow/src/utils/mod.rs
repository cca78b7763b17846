//! Utility functions for run ids and instant formatting.

pub mod timestamps;
mod ids;

pub use ids::{generate_run_id, generate_uuid};
pub use timestamps::{format_instant, iso_timestamp, parse_instant, Timestamp, TimestampError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_v4() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_run_ids_are_distinct() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_iso_timestamp_is_utc() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }
}
