//! Pipeline and step declarations.
//!
//! One `Pipeline` per YAML document. The loader captures template
//! expression text verbatim inside `variables` and step `config`; nothing
//! here is rendered.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

/// A single pipeline declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    #[serde(rename = "pipeline_name", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// True if the pipeline's tag list includes `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Extract the optional `microbatch` sub-record from `variables`.
    ///
    /// # Errors
    ///
    /// Returns the deserialization detail when the sub-record is present
    /// but malformed (bad `batch_size`, wrong field types, ...).
    pub fn microbatch(&self) -> Result<Option<MicrobatchConfig>, String> {
        match self.variables.get("microbatch") {
            None => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|e| e.to_string()),
        }
    }

    /// Pipeline variables minus the reserved `microbatch` sub-record.
    pub fn plain_variables(&self) -> impl Iterator<Item = (&String, &serde_yaml::Value)> {
        self.variables.iter().filter(|(k, _)| *k != "microbatch")
    }
}

/// Step kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Source,
    Processor,
    Endpoint,
}

impl StepKind {
    /// Wire-format string, matching the YAML `type` key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Processor => "processor",
            Self::Endpoint => "endpoint",
        }
    }

    /// YAML key carrying the component tag for this kind.
    #[must_use]
    pub fn type_key(self) -> &'static str {
        match self {
            Self::Source => "source_type",
            Self::Processor => "processor_type",
            Self::Endpoint => "endpoint_type",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a pipeline's step graph.
///
/// The component tag arrives under the kind-specific YAML key
/// (`source_type` / `processor_type` / `endpoint_type`); deserialization
/// folds it into `component_type` and rejects mismatched keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawStep")]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    pub component_type: String,
    pub connection: Option<String>,
    pub depends_on: Vec<String>,
    pub config: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "type")]
    kind: StepKind,
    source_type: Option<String>,
    processor_type: Option<String>,
    endpoint_type: Option<String>,
    connection: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let tags = [
            (StepKind::Source, &raw.source_type),
            (StepKind::Processor, &raw.processor_type),
            (StepKind::Endpoint, &raw.endpoint_type),
        ];
        for (kind, tag) in &tags {
            if tag.is_some() && *kind != raw.kind {
                return Err(format!(
                    "step '{}' has type '{}' but declares '{}'",
                    raw.id,
                    raw.kind,
                    kind.type_key()
                ));
            }
        }
        let component_type = tags
            .iter()
            .find(|(kind, _)| *kind == raw.kind)
            .and_then(|(_, tag)| (*tag).clone())
            .ok_or_else(|| {
                format!(
                    "step '{}' is missing '{}'",
                    raw.id,
                    raw.kind.type_key()
                )
            })?;

        Ok(Self {
            id: raw.id,
            kind: raw.kind,
            component_type,
            connection: raw.connection,
            depends_on: raw.depends_on,
            config: raw.config,
        })
    }
}

/// Microbatch settings carried under the pipeline's `variables.microbatch`
/// sub-record. `begin`/`end` are kept verbatim; the execution strategy
/// parses them when the plan is built.
#[derive(Debug, Clone, Deserialize)]
pub struct MicrobatchConfig {
    pub event_time_column: String,
    pub batch_size: BatchSize,
    #[serde(default)]
    pub lookback: u32,
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Fixed batch window sizes. `month` and `year` are 30 and 365 days by
/// contract, not calendar arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BatchSize {
    #[serde(rename = "10min")]
    TenMin,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "year")]
    Year,
}

impl BatchSize {
    /// The window length.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::TenMin => Duration::minutes(10),
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
            Self::Week => Duration::weeks(1),
            Self::Month => Duration::days(30),
            Self::Year => Duration::days(365),
        }
    }

    /// Wire-format tag, matching the YAML value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TenMin => "10min",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl std::fmt::Display for BatchSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open time interval `[start, end)` assigned to one microbatch
/// sub-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub period: BatchSize,
    pub event_time_column: String,
}
