//! File-backed state store.

use std::fs;
use std::path::{Path, PathBuf};

use dft_types::StateMap;

use crate::error::{Result, StateError};

/// Per-project state store rooted at `<project>/.dft/state/`.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// A store for the project rooted at `project_root`. The directory is
    /// created lazily on first save.
    #[must_use]
    pub fn new(project_root: &Path) -> Self {
        Self {
            dir: project_root.join(".dft").join("state"),
        }
    }

    /// The state directory this store writes into.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, pipeline: &str) -> PathBuf {
        self.dir.join(format!("pipeline_{pipeline}.json"))
    }

    /// Load a pipeline's state. A missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O failure or a corrupt file.
    pub fn load(&self, pipeline: &str) -> Result<StateMap> {
        let path = self.file_for(pipeline);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateMap::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| StateError::Corrupt {
            file: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Atomically replace a pipeline's state: write to a temp file in the
    /// same directory, then rename over the target. On failure the previous
    /// contents are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O failure.
    pub fn save(&self, pipeline: &str, state: &StateMap) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(pipeline);
        let tmp = self.dir.join(format!(".pipeline_{pipeline}.json.tmp"));

        let encoded =
            serde_json::to_string_pretty(state).expect("a string-keyed map serializes");
        fs::write(&tmp, encoded)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::debug!(pipeline, file = %path.display(), "State saved");
        Ok(())
    }

    /// Read-modify-write: merge `entries` into the current state and save.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O failure or a corrupt file.
    pub fn update<I>(&self, pipeline: &str, entries: I) -> Result<StateMap>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut state = self.load(pipeline)?;
        state.extend(entries);
        self.save(pipeline, &state)?;
        Ok(state)
    }
}
