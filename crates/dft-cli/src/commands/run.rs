use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::Ordering;

use chrono::Local;
use dft_engine::component::ComponentRegistry;
use dft_engine::project;
use dft_engine::{Orchestrator, RunOptions};

/// Execute the `run` command: load, validate, select, and run pipelines.
pub async fn execute(
    project_dir: &Path,
    select: Vec<String>,
    exclude: Vec<String>,
    vars: &[String],
    full_refresh: bool,
) -> u8 {
    let vars = parse_vars(vars);
    let options = {
        let mut options = RunOptions::new(Local::now().naive_local());
        options.select = select;
        options.exclude = exclude;
        options.vars = vars;
        options.full_refresh = full_refresh;
        options
    };

    // Ctrl-C flips the cooperative flag; the in-flight step finishes, no
    // new pipelines or windows start.
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancellation requested; finishing the in-flight step");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let project_dir = project_dir.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || {
        let project = project::load_project(&project_dir)?;
        let orchestrator = Orchestrator::new(project, ComponentRegistry::with_builtins());
        orchestrator.run(&options)
    })
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(join_err) => {
            eprintln!("Error: run task panicked: {join_err}");
            return 1;
        }
    };

    match result {
        Ok(report) => {
            println!("Pipelines:");
            for name in &report.order {
                println!("  {name}: {}", report.statuses[name]);
            }
            let (success, failure, skipped) = report.counts();
            println!("{success} succeeded, {failure} failed, {skipped} skipped");
            report.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

/// Parse `key=value[,key=value...]` override arguments. Later entries win.
fn parse_vars(args: &[String]) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for arg in args {
        for pair in arg.split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                vars.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vars_pairs() {
        let vars = parse_vars(&["a=1,b=2".to_string(), "c= 3 ".to_string()]);
        assert_eq!(vars["a"], "1");
        assert_eq!(vars["b"], "2");
        assert_eq!(vars["c"], "3");
    }

    #[test]
    fn test_parse_vars_later_wins() {
        let vars = parse_vars(&["a=1".to_string(), "a=2".to_string()]);
        assert_eq!(vars["a"], "2");
    }

    #[test]
    fn test_parse_vars_ignores_malformed() {
        let vars = parse_vars(&["novalue".to_string()]);
        assert!(vars.is_empty());
    }
}
