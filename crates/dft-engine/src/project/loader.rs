//! Parse the project file and all pipeline declarations into typed models.
//!
//! The loader captures template expression text verbatim; rendering happens
//! later, when components are instantiated. `.env` is loaded here exactly
//! once, before anything else reads the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dft_types::{Pipeline, ProjectConfig};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Name of the project file a DFT directory is identified by.
pub const PROJECT_FILE: &str = "dft_project.yml";

/// A fully loaded project: config plus every pipeline declaration, keyed
/// by pipeline name.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub pipelines: BTreeMap<String, Pipeline>,
    /// Declaration file per pipeline, for error reporting.
    pub pipeline_files: BTreeMap<String, PathBuf>,
}

/// Load the project rooted at `root`.
///
/// # Errors
///
/// Returns [`EngineError::Project`] for a missing/unparseable project
/// file, [`EngineError::PipelineParse`] for schema violations, and
/// [`EngineError::DuplicatePipeline`] when two declarations share a name.
pub fn load_project(root: &Path) -> Result<Project> {
    // One-shot: later lookups must already see the file's values.
    let _ = dotenvy::from_path(root.join(".env"));

    let project_path = root.join(PROJECT_FILE);
    let content = std::fs::read_to_string(&project_path).map_err(|e| {
        EngineError::Project(format!(
            "cannot read {}: {e}",
            project_path.display()
        ))
    })?;
    let config: ProjectConfig = serde_yaml::from_str(&content)
        .map_err(|e| EngineError::Project(format!("{}: {e}", project_path.display())))?;

    let mut pipelines = BTreeMap::new();
    let mut pipeline_files: BTreeMap<String, PathBuf> = BTreeMap::new();

    let pipelines_dir = root.join("pipelines");
    if pipelines_dir.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(&pipelines_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml" | "yaml")
                )
            })
            .collect();
        files.sort();

        for file in files {
            for pipeline in parse_pipeline_file(&file)? {
                if let Some(previous) = pipeline_files.get(&pipeline.name) {
                    return Err(EngineError::DuplicatePipeline {
                        name: pipeline.name,
                        files: vec![previous.clone(), file.clone()],
                    });
                }
                pipeline_files.insert(pipeline.name.clone(), file.clone());
                pipelines.insert(pipeline.name.clone(), pipeline);
            }
        }
    }

    tracing::debug!(
        project = config.project_name,
        pipelines = pipelines.len(),
        "Project loaded"
    );

    Ok(Project {
        root: root.to_path_buf(),
        config,
        pipelines,
        pipeline_files,
    })
}

/// Parse one pipeline file. Files may hold several declarations separated
/// by the YAML document delimiter; empty documents are skipped.
fn parse_pipeline_file(file: &Path) -> Result<Vec<Pipeline>> {
    let content = std::fs::read_to_string(file).map_err(|e| EngineError::PipelineParse {
        file: file.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut pipelines = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&content) {
        let value =
            serde_yaml::Value::deserialize(document).map_err(|e| EngineError::PipelineParse {
                file: file.to_path_buf(),
                detail: e.to_string(),
            })?;
        if value.is_null() {
            continue;
        }
        let pipeline: Pipeline =
            serde_yaml::from_value(value).map_err(|e| EngineError::PipelineParse {
                file: file.to_path_buf(),
                detail: e.to_string(),
            })?;
        pipelines.push(pipeline);
    }
    Ok(pipelines)
}

impl Project {
    /// Whether `root` looks like a DFT project directory.
    #[must_use]
    pub fn exists_at(root: &Path) -> bool {
        root.join(PROJECT_FILE).is_file()
    }
}
