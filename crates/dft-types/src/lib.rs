//! Shared DFT data model types.
//!
//! Pure data: project and pipeline declarations, batch windows, data
//! packets, and state records. No I/O lives here so every other crate can
//! depend on this one without cycles.

pub mod packet;
pub mod pipeline;
pub mod project;
pub mod state;
pub mod time;

pub use packet::{DataPacket, Table};
pub use pipeline::{BatchSize, BatchWindow, MicrobatchConfig, Pipeline, Step, StepKind};
pub use project::{ConnectionConfig, LoggingOptions, ProjectConfig, StateOptions};
pub use state::{PipelineStatus, StateMap};
