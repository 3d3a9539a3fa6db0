//! machine-verify CLI - Main Entry Point
//!
//! Runs the machine verification scenarios against a container engine and
//! writes a JSON results file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{config, list, run};

/// Verify machine images by driving a container engine end to end
#[derive(Parser)]
#[command(name = "machine-verify")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file (TOML)
    #[arg(
        short,
        long,
        env = "MACHINE_VERIFY_CONFIG",
        default_value = "machine-verify.toml",
        global = true
    )]
    config: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios
    Run(run::RunArgs),

    /// List scenarios
    List(list::ListArgs),

    /// Show the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &cli.config, cli.format),
        Commands::List(args) => list::execute(args, cli.format),
        Commands::Config => config::execute(&cli.config, cli.format),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
