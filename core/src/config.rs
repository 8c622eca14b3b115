//! Configuration loading and validation for the supervisor
//!
//! Settings are read from TOML, either as top-level keys or under a
//! `[supervisor]` table. Every field has a default, so an empty file is a
//! valid configuration. Validation errors carry the field path.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Exit code reported when a command could not be launched
pub const DEFAULT_SPAWN_FAILURE_EXIT_CODE: i32 = -1;
/// Exit code reported when waiting for a process failed
pub const DEFAULT_WAIT_FAILURE_EXIT_CODE: i32 = -1;
/// Exit code reported for processes stopped on request
pub const DEFAULT_TERMINATED_EXIT_CODE: i32 = -1;
/// Default capacity of the supervisor's event bus
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
/// Default time the exit watcher lets output readers flush after an exit
pub const DEFAULT_OUTPUT_DRAIN_TIMEOUT_MS: u64 = 500;

/// Tunables for a [`crate::supervisor::ProcessSupervisor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorSettings {
    /// Sentinel exit code for spawn failures
    pub spawn_failure_exit_code: i32,
    /// Sentinel exit code for failures of the exit-wait mechanism
    pub wait_failure_exit_code: i32,
    /// Sentinel exit code for processes stopped on request
    pub terminated_exit_code: i32,
    /// Capacity of the broadcast event bus
    pub event_channel_capacity: usize,
    /// Optional per-stream cap on retained output lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_lines: Option<usize>,
    /// How long, after a natural exit, to wait for the output readers to
    /// reach end-of-stream before finalizing; 0 disables the wait
    pub output_drain_timeout_ms: u64,
    /// Default tracing level for front-ends
    pub log_level: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            spawn_failure_exit_code: DEFAULT_SPAWN_FAILURE_EXIT_CODE,
            wait_failure_exit_code: DEFAULT_WAIT_FAILURE_EXIT_CODE,
            terminated_exit_code: DEFAULT_TERMINATED_EXIT_CODE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            max_output_lines: None,
            output_drain_timeout_ms: DEFAULT_OUTPUT_DRAIN_TIMEOUT_MS,
            log_level: "info".to_string(),
        }
    }
}

/// Settings file that nests the settings under `[supervisor]`
#[derive(Debug, Deserialize)]
struct NestedSettingsFile {
    supervisor: SupervisorSettings,
}

impl SupervisorSettings {
    /// Validate the settings and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        for (field, code) in [
            ("spawnFailureExitCode", self.spawn_failure_exit_code),
            ("waitFailureExitCode", self.wait_failure_exit_code),
            ("terminatedExitCode", self.terminated_exit_code),
        ] {
            if (0..=255).contains(&code) {
                return Err(CoreError::ValidationError(format!(
                    "{}: must be outside 0..=255 so it cannot be mistaken for a real exit code",
                    field
                )));
            }
        }

        if self.event_channel_capacity == 0 {
            return Err(CoreError::ValidationError(
                "eventChannelCapacity: must be > 0".to_string(),
            ));
        }

        if self.max_output_lines == Some(0) {
            return Err(CoreError::ValidationError(
                "maxOutputLines: must be > 0".to_string(),
            ));
        }

        if self.log_level.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "logLevel: cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load settings from a TOML file path
pub fn load_settings_from_toml_path(path: impl AsRef<Path>) -> Result<SupervisorSettings> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_settings_from_toml_str(&data)
}

/// Load settings from a TOML string
pub fn load_settings_from_toml_str(input: &str) -> Result<SupervisorSettings> {
    let value: toml::Table = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;

    let settings = if value.contains_key("supervisor") {
        let nested: NestedSettingsFile = toml::from_str(input)
            .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
        nested.supervisor
    } else {
        toml::from_str::<SupervisorSettings>(input)
            .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?
    };

    settings.validate()?;
    Ok(settings)
}
