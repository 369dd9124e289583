//! planexec - plan-and-execute agent over local Ollama models
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use planexec::cli::commands;
use planexec::Config;
use tracing_subscriber::EnvFilter;

/// planexec - plan, execute, assess and replan towards an objective
#[derive(Parser, Debug)]
#[command(name = "planexec")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model for every role (overridden by the per-role flags)
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    /// Planner model
    #[arg(long, global = true)]
    planner: Option<String>,

    /// Step executor model (needs tool calling)
    #[arg(long, global = true)]
    executor: Option<String>,

    /// Goal assessor model
    #[arg(long, global = true)]
    assessor: Option<String>,

    /// Replanning rounds before a run is stopped
    #[arg(long, global = true)]
    max_replans: Option<usize>,

    /// Directory holding workflows.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent on an objective
    Run {
        /// What to achieve
        objective: String,
    },
    /// Manage stored workflows
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
        /// Print the built-in defaults as TOML
        #[arg(long)]
        defaults: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WorkflowCommand {
    /// List saved workflows
    List,
    /// Print a workflow document
    Show { id: String },
    /// Save a workflow from a JSON or YAML file
    Save {
        file: PathBuf,
        /// Id to save under (default: derived from the name)
        #[arg(long)]
        id: Option<String>,
    },
    /// Rename a workflow
    Rename { id: String, name: String },
    /// Delete a workflow and its logs
    Delete { id: String },
    /// Run a workflow's objective and record the execution log
    Run { id: String },
    /// Show the most recent execution log
    LastLog { id: String },
}

fn init_tracing(debug: bool) {
    let default = if debug { "planexec=debug" } else { "planexec=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(ref model) = args.model {
        config.set_all_models(model.clone());
    }
    if let Some(ref planner) = args.planner {
        config.models.planner = planner.clone();
    }
    if let Some(ref executor) = args.executor {
        config.models.executor = executor.clone();
    }
    if let Some(ref assessor) = args.assessor {
        config.models.assessor = assessor.clone();
    }
    if let Some(max_replans) = args.max_replans {
        config.agent.max_replans = max_replans;
    }
    if let Some(ref data_dir) = args.data_dir {
        config.store.data_dir = data_dir.clone();
    }
    if args.debug {
        config.agent.debug = true;
    }

    init_tracing(config.agent.debug);

    match args.command {
        Command::Run { objective } => {
            let outcome = commands::run_objective(&config, &objective).await?;
            println!("{}", commands::render_outcome(&outcome, args.json)?);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Command::Workflow(cmd) => {
            let store = commands::open_store(&config).await?;
            let output = match cmd {
                WorkflowCommand::List => commands::list_workflows(store.as_ref(), args.json).await?,
                WorkflowCommand::Show { id } => commands::show_workflow(store.as_ref(), &id).await?,
                WorkflowCommand::Save { file, id } => {
                    commands::save_workflow(store.as_ref(), &file, id.as_deref()).await?
                }
                WorkflowCommand::Rename { id, name } => {
                    commands::rename_workflow(store.as_ref(), &id, &name).await?
                }
                WorkflowCommand::Delete { id } => commands::delete_workflow(store.as_ref(), &id).await?,
                WorkflowCommand::LastLog { id } => {
                    commands::last_log(store.as_ref(), &id, args.json).await?
                }
                WorkflowCommand::Run { id } => {
                    let outcome = commands::run_workflow(&config, store, &id).await?;
                    println!("{}", commands::render_outcome(&outcome, args.json)?);
                    if !outcome.success {
                        std::process::exit(1);
                    }
                    return Ok(());
                }
            };
            println!("{}", output);
        }
        Command::Config { init, defaults } => {
            if defaults {
                println!("{}", Config::default_config_toml());
            } else if init {
                let path = config.save_and_get_path()?;
                println!("Wrote {}", path.display());
            } else if args.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", commands::show_config(&config));
            }
        }
    }

    Ok(())
}
