//! Reconcile the state-directory entry in the project's `.gitignore`.

use std::fs;
use std::path::Path;

use crate::error::Result;

const IGNORE_ENTRY: &str = ".dft/";

/// Ensure `.gitignore` matches the project's `state.ignore_in_git` option.
///
/// Returns `true` when the file was modified.
///
/// # Errors
///
/// Returns [`StateError`](crate::StateError) on I/O failure.
pub fn update_gitignore(project_root: &Path, ignore_in_git: bool) -> Result<bool> {
    let path = project_root.join(".gitignore");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let has_entry = content.lines().any(|line| line.trim() == IGNORE_ENTRY);
    match (ignore_in_git, has_entry) {
        (true, false) => {
            let mut updated = content;
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(IGNORE_ENTRY);
            updated.push('\n');
            fs::write(&path, updated)?;
            tracing::info!(file = %path.display(), "Added state directory to .gitignore");
            Ok(true)
        }
        (false, true) => {
            let updated: String = content
                .lines()
                .filter(|line| line.trim() != IGNORE_ENTRY)
                .map(|line| format!("{line}\n"))
                .collect();
            fs::write(&path, updated)?;
            tracing::info!(file = %path.display(), "Removed state directory from .gitignore");
            Ok(true)
        }
        _ => Ok(false),
    }
}
