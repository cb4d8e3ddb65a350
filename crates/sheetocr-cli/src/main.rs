//! CLI application for filling spreadsheet cells from OCR'd document regions.

mod adapters;
mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{check, config, run};

/// sheetocr - Read fixed regions of report PDFs into per-entity worksheets
#[derive(Parser)]
#[command(name = "sheetocr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every entity in a configuration table
    Run(run::RunArgs),

    /// Validate a configuration table and the environment
    Check(check::CheckArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => run::run(args, cli.config.as_deref()).await,
        Commands::Check(args) => check::run(args, cli.config.as_deref()).await,
        Commands::Config(args) => {
            config::run(args, cli.config.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
