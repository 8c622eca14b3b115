//! Event system for the overseer supervisor
//!
//! This module defines the events the supervisor publishes on its broadcast
//! bus. They mirror the callback path (`on_output` / `on_exit`) so that a
//! front-end can subscribe once instead of wiring callbacks per process.
//!
//! Ordering: `Output` events for one stream of one process arrive in the
//! order the lines were produced. No ordering is promised between the stdout
//! and stderr streams of the same process.

use crate::process::{OutputStream, ProcessStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Events emitted by the supervisor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum ProcessEvent {
    /// Process was spawned and is now running
    #[serde(rename_all = "camelCase")]
    Started {
        /// Process identifier
        process_id: String,
        /// Command line that was executed
        command: String,
        /// OS process id
        pid: u32,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// The command could not be launched
    #[serde(rename_all = "camelCase")]
    SpawnFailed {
        /// Process identifier
        process_id: String,
        /// Command line that was attempted
        command: String,
        /// Diagnostic message
        message: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// A line was captured from one of the output streams
    #[serde(rename_all = "camelCase")]
    Output {
        /// Process identifier
        process_id: String,
        /// Stream the line came from
        stream: OutputStream,
        /// Line content, trimmed
        line: String,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },

    /// Process reached a terminal status
    #[serde(rename_all = "camelCase")]
    Exited {
        /// Process identifier
        process_id: String,
        /// Terminal status
        status: ProcessStatus,
        /// Final exit code
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        /// Event timestamp in RFC3339 format
        timestamp: String,
    },
}

/// Event severity level for filtering
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub enum EventSeverity {
    /// Debug information
    Debug,
    /// Informational events
    Info,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
}

impl ProcessEvent {
    /// Identifier of the process this event belongs to
    #[must_use]
    pub fn process_id(&self) -> &str {
        match self {
            Self::Started { process_id, .. }
            | Self::SpawnFailed { process_id, .. }
            | Self::Output { process_id, .. }
            | Self::Exited { process_id, .. } => process_id,
        }
    }

    /// Timestamp of the event
    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Started { timestamp, .. }
            | Self::SpawnFailed { timestamp, .. }
            | Self::Output { timestamp, .. }
            | Self::Exited { timestamp, .. } => timestamp,
        }
    }

    /// Severity used by front-ends to pick a log level or colour
    #[must_use]
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::Started { .. } => EventSeverity::Info,
            Self::Output { stream, .. } => {
                if stream.is_error() {
                    EventSeverity::Warning
                } else {
                    EventSeverity::Debug
                }
            }
            Self::SpawnFailed { .. } => EventSeverity::Error,
            Self::Exited {
                status, exit_code, ..
            } => match (status, exit_code) {
                (ProcessStatus::Exited, Some(0)) => EventSeverity::Info,
                (ProcessStatus::Terminated, _) => EventSeverity::Info,
                _ => EventSeverity::Warning,
            },
        }
    }

    /// Create a current timestamp string in RFC3339 format
    #[must_use]
    pub fn current_timestamp() -> String {
        humantime::format_rfc3339_millis(SystemTime::now()).to_string()
    }

    /// Create a process started event
    #[must_use]
    pub fn started(process_id: String, command: String, pid: u32) -> Self {
        Self::Started {
            process_id,
            command,
            pid,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a spawn failure event
    #[must_use]
    pub fn spawn_failed(process_id: String, command: String, message: String) -> Self {
        Self::SpawnFailed {
            process_id,
            command,
            message,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create an output line event
    #[must_use]
    pub fn output(process_id: String, stream: OutputStream, line: String) -> Self {
        Self::Output {
            process_id,
            stream,
            line,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Create a terminal status event
    #[must_use]
    pub fn exited(process_id: String, status: ProcessStatus, exit_code: Option<i32>) -> Self {
        Self::Exited {
            process_id,
            status,
            exit_code,
            timestamp: Self::current_timestamp(),
        }
    }
}
