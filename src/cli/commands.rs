//! CLI command definitions for mlforge.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use crate::config::{PipelineSettings, StepSelection};
use crate::pipeline::{PipelineDriver, StageStatus};
use crate::registry::StageRegistry;
use crate::stage::ProcessExecutor;

/// Default configuration file, matching the reference project layout.
const DEFAULT_CONFIG: &str = "config.yaml";

/// Configuration-driven ML pipeline orchestrator.
#[derive(Parser)]
#[command(name = "mlforge")]
#[command(about = "Run reproducible ML data/training pipelines with versioned artifacts")]
#[command(version)]
#[command(
    long_about = "mlforge drives a fixed sequence of data-processing and model-training stages.\n\nEach stage runs as an isolated MLflow project with a flat parameter set; artifacts\nare tracked by name:version across stages. Any stage failure aborts the rest.\n\nExample usage:\n  mlforge run --config config.yaml --steps basic_cleaning,data_check"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline's active stage set.
    Run(RunArgs),

    /// List the stage catalog in execution order.
    Stages,
}

/// Arguments for `mlforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override the configured stage selection ("all" or a
    /// comma-separated list of stage names).
    #[arg(short, long)]
    pub steps: Option<String>,

    /// Project root containing the per-stage components.
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Shared data directory (default: ./data).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed CLI command.
///
/// Exits through the returned `Result`: a failed run surfaces the
/// failing stage's name in the error chain and the process exits
/// non-zero.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Stages => {
            list_stages();
            Ok(())
        }
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = PipelineSettings::from_file(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    if let Some(steps) = &args.steps {
        settings.main.steps = StepSelection::parse(steps);
    }

    let executor = ProcessExecutor::new(&args.project_root);
    let mut driver = PipelineDriver::new(executor);
    if let Some(data_dir) = args.data_dir {
        driver = driver.with_data_dir(data_dir);
    }

    match driver.run(&settings).await {
        Ok(report) => {
            info!(
                "Run {} finished: {}/{} stages completed",
                report.run_id,
                report.completed(),
                report
                    .outcomes
                    .iter()
                    .filter(|o| o.status != StageStatus::Skipped)
                    .count()
            );
            Ok(())
        }
        Err(err) => {
            if let Some(stage) = err.failing_stage() {
                error!("Pipeline failed at stage '{}'", stage);
            }
            Err(err.into())
        }
    }
}

fn list_stages() {
    let registry = StageRegistry::builtin();
    println!("{:<3} {:<24} {:<32} {}", "#", "stage", "target", "in 'all'");
    for stage in registry.stages() {
        println!(
            "{:<3} {:<24} {:<32} {}",
            stage.ordinal,
            stage.name(),
            stage.target,
            if stage.included_in_all { "yes" } else { "no" }
        );
    }
}
