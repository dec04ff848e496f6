//! Values produced by template expression evaluation.

use chrono::{Duration, NaiveDateTime};
use dft_types::time::format_timestamp;

/// A template expression value. Timestamps render as ISO-8601 strings and
/// support `.strftime(fmt)` / `.isoformat()`; durations exist only as
/// arithmetic operands.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
    Duration(Duration),
}

impl TemplateValue {
    /// Human-readable type tag for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Duration(_) => "timedelta",
        }
    }

    /// Convert a YAML variable declaration into a template value.
    /// Mappings and sequences are carried as their JSON text; the renderer
    /// never looks inside them.
    #[must_use]
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(*b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_yaml::Value::String(s) => Self::Str(s.clone()),
            other => {
                let json = serde_json::to_value(other)
                    .unwrap_or(serde_json::Value::Null);
                Self::Str(json.to_string())
            }
        }
    }

    /// Convert a JSON state value into a template value.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Str(s.clone()),
            other => Self::Str(other.to_string()),
        }
    }

    /// The JSON form handed to components.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::from(s.clone()),
            Self::Timestamp(ts) => serde_json::Value::from(format_timestamp(*ts)),
            Self::Duration(d) => serde_json::Value::from(d.num_seconds()),
        }
    }
}

impl std::fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Timestamp(ts) => f.write_str(&format_timestamp(*ts)),
            Self::Duration(d) => write!(f, "{}s", d.num_seconds()),
        }
    }
}
