use std::path::Path;

use dft_engine::component::ComponentRegistry;
use dft_engine::project;
use dft_engine::Orchestrator;

/// Execute the `deps` command: print the resolved pipeline graph in
/// execution order.
pub fn execute(project_dir: &Path, select: &[String]) -> u8 {
    let project = match project::load_project(project_dir) {
        Ok(project) => project,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    let orchestrator = Orchestrator::new(project, ComponentRegistry::with_builtins());
    let order = match orchestrator.resolve_selection(select, &[]) {
        Ok(order) => order,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    for name in &order {
        let pipeline = &orchestrator.project().pipelines[name];
        if pipeline.depends_on.is_empty() {
            println!("{name}");
        } else {
            println!("{name} (depends_on: {})", pipeline.depends_on.join(", "));
        }
        for step in &pipeline.steps {
            println!("  {} [{}:{}]", step.id, step.kind, step.component_type);
        }
    }
    0
}
