//! Project-level configuration loaded from `dft_project.yml`.

use std::collections::BTreeMap;

use serde::Deserialize;

/// The project file. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,
    #[serde(default)]
    pub state: StateOptions,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub logging: LoggingOptions,
}

/// Options for the on-disk state store.
#[derive(Debug, Clone, Deserialize)]
pub struct StateOptions {
    /// Whether the state directory is listed in the project's `.gitignore`.
    #[serde(default = "default_ignore_in_git")]
    pub ignore_in_git: bool,
}

fn default_ignore_in_git() -> bool {
    true
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            ignore_in_git: default_ignore_in_git(),
        }
    }
}

/// A reusable connection record referenced by pipeline steps via
/// `connection: <id>`. The `type` tag discriminates the driver; all other
/// fields are passed through to the component untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

/// Logging options carried by the project file.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingOptions {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
