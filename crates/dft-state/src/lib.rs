//! Durable per-pipeline key/value state.
//!
//! One JSON file per pipeline under `.dft/state/`, replaced atomically on
//! save. Single-writer per pipeline; the orchestrator guarantees no two
//! windows of the same pipeline run concurrently.

mod error;
mod gitignore;
mod store;

pub use error::{Result, StateError};
pub use gitignore::update_gitignore;
pub use store::StateStore;
