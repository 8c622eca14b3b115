//! Process management utilities for the overseer core library
//!
//! This module holds the platform process binding used by the supervisor:
//! spawning a command with piped output, waiting for its exit code, and
//! killing it by pid. Command lines are split naively on whitespace; quoting
//! and escaping are not interpreted.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;

use crate::{CoreError, Result};

/// Split a command line into an executable and its arguments.
///
/// Splitting is on runs of whitespace only. `sh -c "echo hi"` therefore
/// yields `["-c", "\"echo", "hi\""]` as arguments.
///
/// # Errors
///
/// Returns [`CoreError::ValidationError`] when the line contains no
/// executable.
pub fn split_command_line(command_line: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| CoreError::ValidationError("command line is empty".to_string()))?;
    Ok((program.to_string(), parts.map(str::to_string).collect()))
}
