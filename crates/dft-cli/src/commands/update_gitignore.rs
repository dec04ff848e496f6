use std::path::Path;

use dft_engine::project;

/// Execute the `update-gitignore` command: reconcile the `.dft/` entry
/// with the project's `state.ignore_in_git` option.
pub fn execute(project_dir: &Path) -> u8 {
    let project = match project::load_project(project_dir) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    match dft_state::update_gitignore(&project.root, project.config.state.ignore_in_git) {
        Ok(true) => {
            println!(".gitignore updated");
            0
        }
        Ok(false) => {
            println!(".gitignore already up to date");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}
