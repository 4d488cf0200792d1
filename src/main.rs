mod cli;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// scheduler - Workforce event auto-scheduling engine
#[derive(Parser)]
#[command(name = "scheduler")]
#[command(about = "Auto-scheduling engine for workforce event assignment", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a seed file, run the auto-scheduler, and append the result to an output file
    Run {
        /// JSON file describing employees, events, rotations, and availability
        #[arg(long)]
        seed: String,

        /// JSON file the completed run and its assignments are appended to
        #[arg(long, default_value = "runs.json")]
        output: String,

        /// Run as a manually-triggered run instead of the default automatic run
        #[arg(long)]
        manual: bool,
    },
    /// Print a previously completed run's assignments from an output file
    ShowRun {
        /// JSON file previously produced by `run`
        #[arg(long, default_value = "runs.json")]
        output: String,

        /// Run id to display
        #[arg(long)]
        run_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = crate::config::Config::load(cli.config.as_deref())?;

    let env_filter = EnvFilter::new(&config.monitoring.log_level);
    if config.monitoring.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.monitoring.log_target)
                    .with_line_number(config.monitoring.log_line_number)
                    .with_filter(env_filter),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(config.monitoring.log_target)
                    .with_line_number(config.monitoring.log_line_number)
                    .with_filter(env_filter),
            )
            .try_init()?;
    }

    match cli.command {
        Commands::Run { seed, output, manual } => crate::cli::run(config, seed, output, manual).await,
        Commands::ShowRun { output, run_id } => crate::cli::show_run(output, run_id).await,
    }
}
