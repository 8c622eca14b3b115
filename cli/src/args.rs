//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "overseer")]
#[command(about = "Run a command under the overseer process supervisor")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level filter (RUST_LOG overrides it)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a command, stream its output and report how it finished
    Run {
        /// Supervisor settings (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Stop the command after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
        /// Print events and the final snapshot as JSON lines
        #[arg(long)]
        json: bool,
        /// Command line; joined with spaces and split on whitespace
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command_line: Vec<String>,
    },
    /// Print a JSON schema for the machine-readable output
    Schema {
        #[arg(value_enum, default_value_t = SchemaKind::Snapshot)]
        kind: SchemaKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Snapshot,
    Event,
}
