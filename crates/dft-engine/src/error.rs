//! Engine error taxonomy.
//!
//! Typed errors for everything the engine can reject: configuration shape,
//! dependency resolution, graph cycles, selector expressions, templates,
//! microbatch plans, state I/O, and component failures. Validation problems
//! are aggregated into one report before the invocation fails.

use std::path::PathBuf;

use dft_state::StateError;

use crate::template::TemplateError;

/// Any failure raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or unparseable project file.
    #[error("project error: {0}")]
    Project(String),

    /// Schema violation in a pipeline file.
    #[error("failed to parse {}: {detail}", file.display())]
    PipelineParse { file: PathBuf, detail: String },

    /// Two pipeline declarations share a name.
    #[error("duplicate pipeline '{name}' declared in {}", format_files(files))]
    DuplicatePipeline { name: String, files: Vec<PathBuf> },

    /// Missing `depends_on` target, unknown `connection`, or unknown
    /// `component_type`.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// A cycle at either graph level.
    #[error("dependency cycle: {}", participants.join(" -> "))]
    Cycle { participants: Vec<String> },

    /// Malformed selector expression or unknown name/tag.
    #[error("selector error: {0}")]
    Selector(String),

    /// Template evaluation failure.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Invalid microbatch settings: missing `begin`, bad `batch_size`,
    /// `end` before `begin`.
    #[error("microbatch config error: {0}")]
    MicrobatchConfig(String),

    /// State store I/O failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// A component raised; carries pipeline/step context. The cause is
    /// an opaque `anyhow::Error`, so it is carried by value rather than as
    /// a `source()` chain (same shape as wrapping infrastructure errors).
    #[error("{pipeline}.{step}: {cause}")]
    Component {
        pipeline: String,
        step: String,
        cause: anyhow::Error,
    },

    /// Aggregated validation report.
    #[error("validation failed:\n  - {}", issues.join("\n  - "))]
    Validation { issues: Vec<String> },
}

fn format_files(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// Process exit code for this error class: 2 for validation/config
    /// problems, 3 for selector problems, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Selector(_) => 3,
            Self::Project(_)
            | Self::PipelineParse { .. }
            | Self::DuplicatePipeline { .. }
            | Self::Dependency(_)
            | Self::Cycle { .. }
            | Self::MicrobatchConfig(_)
            | Self::Validation { .. } => 2,
            Self::Template(_) | Self::State(_) | Self::Component { .. } => 1,
        }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
