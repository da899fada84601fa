//! Serving Sweep - CLI
//!
//! Runs a serving-configuration sweep against an inference server, or
//! inspects and maintains the results of earlier sweeps.

#![forbid(unsafe_code)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, setup_logging};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // `run` installs logging itself once the run directory exists.
    let _logging_guards = match &cli.command {
        Commands::Run(_) => None,
        _ => Some(setup_logging(cli.verbose, None)?),
    };

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, cli.verbose).await,
        Commands::Analyze { results_dir } => {
            cli::analyze::execute(&results_dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status(config) => {
            cli::maintenance::status(&config.load()?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stop(config) => {
            cli::maintenance::stop(&config.load()?).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { config, json } => cli::maintenance::check(&config.load()?, json),
        Commands::Clean { config, yes } => {
            cli::maintenance::clean(&config.load()?, yes)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Backup(config) => {
            cli::maintenance::backup(&config.load()?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logs { config, no_follow } => {
            cli::maintenance::logs(&config.load()?, no_follow).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
