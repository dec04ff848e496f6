//! Core orchestration engine for DFT pipelines.
//!
//! Turns a directory of pipeline declarations into a correct, incremental,
//! dependency-ordered execution: project loading, the two-level DAG,
//! selector resolution, execution planning (full and microbatch), template
//! rendering, per-pipeline state, and the top-level run loop.

pub mod component;
pub mod dag;
pub mod error;
pub mod orchestrator;
pub mod project;
pub mod runner;
pub mod selector;
pub mod strategy;
pub mod template;

pub use error::{EngineError, Result};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
pub use project::Project;
