//! Timestamp parsing and formatting.
//!
//! The engine commits to one wall-clock zone per invocation; every
//! timestamp inside the core is a [`NaiveDateTime`] in that zone. ISO
//! strings written to state are formatted here so all call sites agree.

use chrono::{NaiveDate, NaiveDateTime};

const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp from any of the accepted declaration formats.
///
/// Accepts ISO date-times with or without seconds (`T` or space
/// separated), bare dates (midnight), and RFC 3339 strings whose offset is
/// dropped in favor of the wall-clock part.
#[must_use]
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim();
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }
    None
}

/// Canonical ISO-8601 rendering used for state values and batch variables.
#[must_use]
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Date-only rendering for the `last_processed_date` compatibility key.
#[must_use]
pub fn format_date(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_datetime() {
        let ts = parse_timestamp("2024-01-01T06:30:00").unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T06:30:00");
    }

    #[test]
    fn test_parse_datetime_without_seconds() {
        let ts = parse_timestamp("2024-01-01T06:30").unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T06:30:00");
    }

    #[test]
    fn test_parse_space_separated() {
        let ts = parse_timestamp("2024-01-01 06:30:00").unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T06:30:00");
    }

    #[test]
    fn test_parse_bare_date_is_midnight() {
        let ts = parse_timestamp("2024-03-15").unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-15T00:00:00");
    }

    #[test]
    fn test_parse_rfc3339_keeps_wall_clock() {
        let ts = parse_timestamp("2024-01-01T06:30:00+02:00").unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-01T06:30:00");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_timestamp("yesterday-ish").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_format_date() {
        let ts = parse_timestamp("2024-03-15T23:59:00").unwrap();
        assert_eq!(format_date(ts), "2024-03-15");
    }
}
