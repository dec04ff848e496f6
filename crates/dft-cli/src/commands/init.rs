use std::fs;
use std::path::{Path, PathBuf};

/// Execute the `init` command: scaffold a project directory.
pub fn execute(parent_dir: &Path, name: &str) -> u8 {
    match scaffold(parent_dir, name) {
        Ok(created) => {
            println!("Initialized DFT project '{name}'");
            println!();
            println!("Created files:");
            for file in &created {
                println!("  {}", file.display());
            }
            println!();
            println!("Next steps:");
            println!("  1. cd {name}");
            println!("  2. Edit dft_project.yml with your connections");
            println!("  3. Add pipeline declarations under pipelines/");
            println!("  Then: dft run");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            2
        }
    }
}

fn scaffold(parent_dir: &Path, name: &str) -> anyhow::Result<Vec<PathBuf>> {
    let base_dir = parent_dir.join(name);
    if base_dir.exists() {
        anyhow::bail!("directory already exists: {}", base_dir.display());
    }
    fs::create_dir_all(base_dir.join("pipelines"))?;
    fs::create_dir_all(base_dir.join("data"))?;

    let mut created = Vec::new();
    let mut write = |rel: &str, content: String| -> anyhow::Result<()> {
        let path = base_dir.join(rel);
        fs::write(&path, content)?;
        created.push(path);
        Ok(())
    };

    write("dft_project.yml", gen_project_yml(name))?;
    write("pipelines/example.yml", gen_example_pipeline())?;
    write("data/example.csv", gen_example_csv())?;
    write(".env", gen_env())?;
    write(".gitignore", ".dft/\n.env\n".to_string())?;

    Ok(created)
}

fn gen_project_yml(name: &str) -> String {
    format!(
        r#"project_name: {name}

state:
  ignore_in_git: true

connections: {{}}

variables:
  data_dir: data

logging:
  level: info
"#
    )
}

fn gen_example_pipeline() -> String {
    r#"pipeline_name: example
description: Copy the sample file, validating on the way
tags: [example]

steps:
  - id: extract
    type: source
    source_type: csv
    config:
      file_path: "{{ var('data_dir') }}/example.csv"

  - id: validate
    type: processor
    processor_type: validator
    depends_on: [extract]
    config:
      required_columns: [id, name]

  - id: publish
    type: endpoint
    endpoint_type: csv
    depends_on: [validate]
    config:
      file_path: "{{ var('data_dir') }}/example_out.csv"
"#
    .to_string()
}

fn gen_example_csv() -> String {
    "id,name\n1,ada\n2,grace\n".to_string()
}

fn gen_env() -> String {
    "# Environment variables read by env_var(...) in pipeline templates\n".to_string()
}
