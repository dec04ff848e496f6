//! State store error types.

/// Errors produced by [`StateStore`](crate::StateStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// File-system I/O failure reading or writing a state file.
    #[error("state i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A state file holds something other than a JSON object.
    #[error("state file {file} is corrupt: {detail}")]
    Corrupt { file: String, detail: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
