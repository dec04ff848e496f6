//! Per-pipeline durable state model.
//!
//! The store itself lives in `dft-state`; these are the shared value types
//! and reserved keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One pipeline's state: string keys to JSON-encoded values.
pub type StateMap = BTreeMap<String, serde_json::Value>;

/// Microbatch cursor (ISO-8601 timestamp).
pub const LAST_PROCESSED_TIMESTAMP: &str = "last_processed_timestamp";
/// Date-only cursor alias, written for backwards compatibility.
pub const LAST_PROCESSED_DATE: &str = "last_processed_date";
/// Terminal status of the last run.
pub const LAST_STATUS: &str = "last_status";
/// ISO-8601 timestamp of the last run.
pub const LAST_RUN_AT: &str = "last_run_at";

/// Terminal status of one pipeline in one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Failure,
    Skipped,
}

impl PipelineStatus {
    /// Wire-format string for storage and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(PipelineStatus::Success.as_str(), "success");
        assert_eq!(PipelineStatus::Failure.as_str(), "failure");
        assert_eq!(PipelineStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let json = serde_json::to_string(&PipelineStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        let back: PipelineStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PipelineStatus::Skipped);
    }
}
