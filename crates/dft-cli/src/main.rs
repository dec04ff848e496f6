mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dft", version, about = "Configuration-driven ETL pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Project directory
    #[arg(long, default_value = ".", global = true)]
    project_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new project directory
    Init {
        /// Project name; also the directory created
        name: String,
    },
    /// Execute selected pipelines in dependency order
    Run {
        /// Selection expression; repeatable
        #[arg(long = "select", short = 's')]
        select: Vec<String>,
        /// Exclusion expression; repeatable
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Variable overrides: key=value[,key=value...]
        #[arg(long)]
        vars: Vec<String>,
        /// Reset microbatch cursors to `begin` before planning
        #[arg(long)]
        full_refresh: bool,
    },
    /// Load and validate the project without executing
    Validate {
        /// Selection expression; repeatable
        #[arg(long = "select", short = 's')]
        select: Vec<String>,
    },
    /// Print the resolved pipeline graph in execution order
    Deps {
        /// Selection expression; repeatable
        #[arg(long = "select", short = 's')]
        select: Vec<String>,
    },
    /// Reconcile the state-directory entry in .gitignore
    UpdateGitignore,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let code = match cli.command {
        Commands::Init { name } => commands::init::execute(&cli.project_dir, &name),
        Commands::Run {
            select,
            exclude,
            vars,
            full_refresh,
        } => commands::run::execute(&cli.project_dir, select, exclude, &vars, full_refresh).await,
        Commands::Validate { select } => commands::validate::execute(&cli.project_dir, &select),
        Commands::Deps { select } => commands::deps::execute(&cli.project_dir, &select),
        Commands::UpdateGitignore => commands::update_gitignore::execute(&cli.project_dir),
    };
    ExitCode::from(code)
}
