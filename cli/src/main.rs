//! Overseer CLI binary
//!
//! Runs a single command under the process supervisor in the foreground.

use clap::Parser;
use cli::args::{Cli, Commands};
use cli::{load_settings, run_command, schema_json, CliError, RunOptions};
use overseer_core::ProcessSupervisor;
use std::time::Duration;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("error[{}]: {}", e.code(), e);
            std::process::exit(2);
        }
    }
}

async fn execute(cli: Cli) -> cli::Result<i32> {
    match cli.command {
        Commands::Run {
            config,
            timeout,
            json,
            command_line,
        } => {
            let mut settings = load_settings(config.as_deref())?;
            if let Some(level) = cli.log_level {
                settings.log_level = level;
            }
            overseer_core::utils::init_tracing(&settings.log_level)?;

            let command_line = command_line.join(" ");
            if command_line.trim().is_empty() {
                return Err(CliError::InvalidArgument("empty command line".to_string()));
            }
            let options = RunOptions {
                command_line,
                timeout: timeout.map(Duration::from_secs),
                json,
            };

            let supervisor = ProcessSupervisor::unix(settings);
            let outcome = run_command(&supervisor, &options, ctrl_c()).await?;
            supervisor.dispose();

            if json {
                println!("{}", serde_json::to_string(&outcome.snapshot)?);
            } else {
                eprintln!("{}", outcome.summary());
            }
            Ok(outcome.exit_code())
        }
        Commands::Schema { kind } => {
            println!("{}", schema_json(kind)?);
            Ok(0)
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
