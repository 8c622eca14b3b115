//! Per-process observer callbacks

use super::ProcessRecord;
use std::fmt;
use std::sync::Arc;

/// Invoked for every captured line: `(record, line, is_error)`
pub type OutputCallback = Arc<dyn Fn(&ProcessRecord, &str, bool) + Send + Sync>;

/// Invoked once when a running process reaches a terminal status
pub type ExitCallback = Arc<dyn Fn(&ProcessRecord) + Send + Sync>;

/// Optional callbacks attached to a process at start time.
///
/// Callbacks run on the supervisor's background tasks, never while a
/// supervisor lock is held, so they may call back into the supervisor.
/// Delivery is in per-stream order; stdout and stderr callbacks may
/// interleave arbitrarily.
#[derive(Clone, Default)]
pub struct ProcessCallbacks {
    on_output: Option<OutputCallback>,
    on_exit: Option<ExitCallback>,
}

impl ProcessCallbacks {
    /// No callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output callback
    pub fn on_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProcessRecord, &str, bool) + Send + Sync + 'static,
    {
        self.on_output = Some(Arc::new(f));
        self
    }

    /// Set the exit callback
    pub fn on_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProcessRecord) + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(f));
        self
    }

    pub(crate) fn notify_output(&self, record: &ProcessRecord, line: &str, is_error: bool) {
        if let Some(cb) = &self.on_output {
            cb(record, line, is_error);
        }
    }

    pub(crate) fn notify_exit(&self, record: &ProcessRecord) {
        if let Some(cb) = &self.on_exit {
            cb(record);
        }
    }
}

impl fmt::Debug for ProcessCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessCallbacks")
            .field("on_output", &self.on_output.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}
