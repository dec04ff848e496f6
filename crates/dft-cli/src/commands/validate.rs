use std::path::Path;

use dft_engine::component::ComponentRegistry;
use dft_engine::project;
use dft_engine::Orchestrator;

/// Execute the `validate` command: loader plus full validation, no
/// execution. Non-zero exit on any error.
pub fn execute(project_dir: &Path, select: &[String]) -> u8 {
    let project = match project::load_project(project_dir) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    let orchestrator = Orchestrator::new(project, ComponentRegistry::with_builtins());
    if let Err(e) = orchestrator.validate() {
        eprintln!("Error: {e}");
        return e.exit_code();
    }

    let selected = match orchestrator.resolve_selection(select, &[]) {
        Ok(selected) => selected,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    println!(
        "Project '{}' is valid ({} pipeline(s) selected)",
        orchestrator.project().config.project_name,
        selected.len()
    );
    0
}
