//! Command-line front-end for the overseer process supervisor
//!
//! `overseer run` starts one command, streams its output and exits with a
//! status derived from how the command finished. `overseer schema` prints
//! the JSON schema of the machine-readable output.

pub mod args;
pub mod error;
pub mod runner;

pub use error::{CliError, Result};
pub use runner::{run_command, RunOptions, RunOutcome, StopReason};

use args::SchemaKind;
use overseer_core::{ProcessEvent, ProcessSnapshot, SupervisorSettings};
use std::path::Path;

/// Load settings from `path`, or defaults when none is given
pub fn load_settings(path: Option<&Path>) -> Result<SupervisorSettings> {
    match path {
        Some(path) => overseer_core::config::load_settings_from_toml_path(path)
            .map_err(|e| CliError::ConfigError(format!("{}: {}", path.display(), e))),
        None => Ok(SupervisorSettings::default()),
    }
}

/// Pretty-printed JSON schema for one of the output documents
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let schema = match kind {
        SchemaKind::Snapshot => schemars::schema_for!(ProcessSnapshot),
        SchemaKind::Event => schemars::schema_for!(ProcessEvent),
    };
    Ok(serde_json::to_string_pretty(&schema)?)
}
