mod commands;
mod output;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;

use commands::calibrate::CalibrateArgs;
use commands::compile::CompileArgs;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "pel", version, about = "Compiler and runtime for the Programmable Economic Language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, typecheck, check provenance, and emit an IR file
    Compile(CompileArgs),
    /// Execute an IR file deterministically, via Monte Carlo, or via sensitivity sweep
    Run(RunArgs),
    /// Fit model parameters against observed CSV data and rewrite the IR
    Calibrate(CalibrateArgs),
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")))
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Compile(args) => commands::compile::run_compile(args),
        Commands::Run(args) => commands::run::run_run(args),
        Commands::Calibrate(args) => commands::calibrate::run_calibrate(args),
    };

    match outcome {
        Ok(exit_ok) => process::exit(if exit_ok { 0 } else { 1 }),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
