//! Per-process state container
//!
//! A [`ProcessRecord`] is shared (`Arc`) between the supervisor registry, the
//! record's background tasks and any caller that kept the reference returned
//! by `start`. Mutable fields live behind one mutex; the terminal transition
//! is a compare-and-set on `status` so only one finalizer ever wins.

use super::completion::CompletionSignal;
use crate::output::OutputBuffer;
use schema::{OutputStream, ProcessEvent, ProcessSnapshot, ProcessStatus};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutable part of a record
#[derive(Debug)]
struct RecordState {
    status: ProcessStatus,
    exit_code: Option<i32>,
    last_output_line: Option<String>,
    is_error_output: bool,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    finished_at: Option<String>,
    /// The OS has reported the exit; the pid may since have been reused
    reaped: bool,
}

/// State of one spawned (or attempted) process
#[derive(Debug)]
pub struct ProcessRecord {
    id: String,
    command: String,
    pid: Option<u32>,
    started_at: String,
    state: Mutex<RecordState>,
    completion: CompletionSignal,
}

/// Diagnostic written to `last_output_line` when finalizing
#[derive(Debug, Clone)]
pub(crate) struct FinalNote {
    pub(crate) line: String,
    pub(crate) is_error: bool,
}

impl ProcessRecord {
    fn with_state(
        id: String,
        command: String,
        pid: Option<u32>,
        status: ProcessStatus,
        max_output_lines: Option<usize>,
    ) -> Self {
        Self {
            id,
            command,
            pid,
            started_at: ProcessEvent::current_timestamp(),
            state: Mutex::new(RecordState {
                status,
                exit_code: None,
                last_output_line: None,
                is_error_output: false,
                stdout: OutputBuffer::new(max_output_lines),
                stderr: OutputBuffer::new(max_output_lines),
                finished_at: None,
                reaped: false,
            }),
            completion: CompletionSignal::new(),
        }
    }

    /// A record for a process that is now running
    pub(crate) fn running(
        id: String,
        command: String,
        pid: u32,
        max_output_lines: Option<usize>,
    ) -> Self {
        Self::with_state(id, command, Some(pid), ProcessStatus::Running, max_output_lines)
    }

    /// A terminal record for a command that could not be launched. The
    /// completion signal has already fired when this returns.
    pub(crate) fn spawn_failed(
        id: String,
        command: String,
        exit_code: i32,
        message: String,
        max_output_lines: Option<usize>,
    ) -> Self {
        let record = Self::with_state(id, command, None, ProcessStatus::Exited, max_output_lines);
        {
            let mut state = record.lock();
            state.exit_code = Some(exit_code);
            state.last_output_line = Some(message);
            state.is_error_output = true;
            state.finished_at = Some(record.started_at.clone());
        }
        record.completion.complete(Some(exit_code));
        record
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unique process handle
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Command line as given to `start`
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id; `None` if the spawn failed
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current status
    pub fn status(&self) -> ProcessStatus {
        self.lock().status
    }

    /// Whether the process is still running
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Final exit code, once terminal
    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    /// Most recent line from either stream
    pub fn last_output_line(&self) -> Option<String> {
        self.lock().last_output_line.clone()
    }

    /// Whether the most recent line is error output
    pub fn is_error_output(&self) -> bool {
        self.lock().is_error_output
    }

    /// Captured stdout lines, oldest first
    pub fn stdout_lines(&self) -> Vec<String> {
        self.lock().stdout.to_vec()
    }

    /// Captured stderr lines, oldest first
    pub fn stderr_lines(&self) -> Vec<String> {
        self.lock().stderr.to_vec()
    }

    /// Whether the completion signal has fired
    pub fn is_completed(&self) -> bool {
        self.completion.is_completed()
    }

    /// Wait for the completion signal and return the exit code it carried.
    ///
    /// Returns immediately if the signal already fired. The value is `None`
    /// only when the supervisor was disposed before the process finished.
    pub async fn wait(&self) -> Option<i32> {
        self.completion.wait().await
    }

    /// Serializable copy of the current state
    pub fn snapshot(&self) -> ProcessSnapshot {
        let state = self.lock();
        ProcessSnapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            pid: self.pid,
            status: state.status,
            exit_code: state.exit_code,
            last_output_line: state.last_output_line.clone(),
            is_error_output: state.is_error_output,
            stdout_lines: state.stdout.to_vec(),
            stderr_lines: state.stderr.to_vec(),
            stdout_dropped: state.stdout.total_dropped(),
            stderr_dropped: state.stderr.total_dropped(),
            started_at: self.started_at.clone(),
            finished_at: state.finished_at.clone(),
        }
    }

    /// Append a captured line and make it the latest output
    pub(crate) fn push_output(&self, stream: OutputStream, line: String) {
        let mut state = self.lock();
        state.last_output_line = Some(line.clone());
        state.is_error_output = stream.is_error();
        match stream {
            OutputStream::Stdout => state.stdout.push(line),
            OutputStream::Stderr => state.stderr.push(line),
        }
    }

    /// Move from `Running` to `status`. Returns `false` without touching
    /// anything if the record is already terminal.
    ///
    /// The completion signal is fired with `exit_code` by the winner.
    pub(crate) fn finalize(
        &self,
        status: ProcessStatus,
        exit_code: i32,
        note: Option<FinalNote>,
    ) -> bool {
        debug_assert!(status.is_terminal());
        {
            let mut state = self.lock();
            if state.status.is_terminal() {
                return false;
            }
            state.status = status;
            state.exit_code = Some(exit_code);
            state.finished_at = Some(ProcessEvent::current_timestamp());
            if let Some(note) = note {
                state.last_output_line = Some(note.line);
                state.is_error_output = note.is_error;
            }
        }
        self.completion.complete(Some(exit_code));
        true
    }

    /// Note that the process has been waited for, so its pid must no longer
    /// be signalled
    pub(crate) fn mark_reaped(&self) {
        self.lock().reaped = true;
    }

    /// Whether the exit has already been observed
    pub(crate) fn is_reaped(&self) -> bool {
        self.lock().reaped
    }

    /// Fire the completion signal with whatever exit code is currently
    /// recorded, without changing the status.
    pub(crate) fn force_complete(&self) -> bool {
        let exit_code = self.lock().exit_code;
        self.completion.complete(exit_code)
    }
}
