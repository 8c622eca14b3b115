//! Process status and snapshot types
//!
//! A supervised process moves through a deliberately small state machine:
//!
//! ```text
//! Running ──natural exit──▶ Exited
//!    └──────stop request──▶ Terminated
//! ```
//!
//! `Exited` and `Terminated` are terminal and mutually exclusive. A process
//! that could not be spawned at all starts life directly in `Exited`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a supervised process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum ProcessStatus {
    /// Process is alive and its output is being captured
    #[default]
    Running,
    /// Process finished on its own (or never started)
    Exited,
    /// Process was stopped on request
    Terminated,
}

impl ProcessStatus {
    /// Whether no further transitions are possible from this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Terminated)
    }

    /// Whether the process is still running
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Output stream identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl OutputStream {
    /// Lines from stderr are flagged as error output
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Stderr)
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Point-in-time copy of a process record
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    /// Unique process handle
    pub id: String,
    /// Command line as given to the supervisor
    pub command: String,
    /// OS process id, absent when the spawn failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Current status
    pub status: ProcessStatus,
    /// Final exit code, set together with the terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Most recent line seen on either stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output_line: Option<String>,
    /// Whether `last_output_line` came from stderr (or is a diagnostic)
    pub is_error_output: bool,
    /// Captured stdout lines in emission order
    #[serde(default)]
    pub stdout_lines: Vec<String>,
    /// Captured stderr lines in emission order
    #[serde(default)]
    pub stderr_lines: Vec<String>,
    /// Stdout lines evicted by the output cap
    #[serde(default)]
    pub stdout_dropped: u64,
    /// Stderr lines evicted by the output cap
    #[serde(default)]
    pub stderr_dropped: u64,
    /// When the record was created, RFC3339
    pub started_at: String,
    /// When the record reached a terminal status, RFC3339
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl ProcessSnapshot {
    /// Whether the process finished with exit code zero
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Exited && self.exit_code == Some(0)
    }
}
