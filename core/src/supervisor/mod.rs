//! Process supervisor implementation
//!
//! This module owns the registry of running processes, spawns new ones,
//! captures their output and arbitrates the race between a caller's
//! [`ProcessSupervisor::stop`] and the process exiting on its own.
//!
//! ## Architecture
//!
//! Each running process has three background tokio tasks: a line reader for
//! stdout, one for stderr, and an exit watcher. All of them hold the same
//! `Arc<ProcessRecord>`.
//!
//! ```text
//! start ──▶ Running ──exit watcher wins──▶ Exited
//!              └──────stop wins──────────▶ Terminated
//! ```
//!
//! Finalization is a compare-and-set on the record's status performed while
//! holding the registry lock, so "status terminal" and "id unregistered"
//! change together and the loser of the race does nothing at all.
//!
//! ## Components
//!
//! - [`ProcessSupervisor`]: public entry point (`start`, `stop`,
//!   `get_process_info`, `dispose`)
//! - [`ProcessRecord`]: per-process state and completion signal
//! - [`ProcessAdapter`]: trait for the platform process binding
//! - [`ProcessCallbacks`]: per-process output / exit observers

use crate::config::SupervisorSettings;
use crate::id::new_process_id;
use crate::process::split_command_line;
use schema::{OutputStream, ProcessEvent, ProcessStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod adapters;
pub mod callbacks;
pub mod completion;
pub mod record;
mod tasks;


pub use adapters::*;
pub use callbacks::*;
pub use completion::CompletionSignal;
pub use record::ProcessRecord;
pub use tasks::STREAM_ERROR_PREFIX;

use record::FinalNote;

/// Line stored in `last_output_line` when a process is stopped on request
pub const TERMINATED_MESSAGE: &str = "Process terminated by user";

/// Prefix of the diagnostic stored when a command cannot be launched
pub const SPAWN_FAILURE_PREFIX: &str = "Failed to start process";

/// Registry slot: the record plus the callbacks given at start
#[derive(Debug, Clone)]
struct RegistryEntry {
    record: Arc<ProcessRecord>,
    callbacks: ProcessCallbacks,
}

/// State shared between the supervisor handle and its background tasks
pub(crate) struct SupervisorInner {
    adapter: Arc<dyn ProcessAdapter>,
    pub(crate) settings: SupervisorSettings,
    registry: Mutex<HashMap<String, RegistryEntry>>,
    event_tx: broadcast::Sender<ProcessEvent>,
}

impl SupervisorInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, RegistryEntry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finalize a record that the caller already holds. On success the id
    /// is unregistered and an `Exited` event published.
    pub(crate) fn finalize(
        &self,
        record: &ProcessRecord,
        status: ProcessStatus,
        exit_code: i32,
        note: Option<FinalNote>,
    ) -> bool {
        let won = {
            let mut registry = self.registry();
            let won = record.finalize(status, exit_code, note);
            if won {
                registry.remove(record.id());
            }
            won
        };
        if won {
            self.publish_exit(record);
        }
        won
    }

    /// Finalize the record registered under `id` if it is still running.
    /// Returns the removed entry when this call won.
    fn finalize_by_id(
        &self,
        id: &str,
        status: ProcessStatus,
        exit_code: i32,
        note: FinalNote,
    ) -> Option<RegistryEntry> {
        let entry = {
            let mut registry = self.registry();
            let entry = registry.get(id)?;
            if !entry.record.finalize(status, exit_code, Some(note)) {
                return None;
            }
            registry.remove(id)?
        };
        self.publish_exit(&entry.record);
        Some(entry)
    }

    fn publish_exit(&self, record: &ProcessRecord) {
        let _ = self.event_tx.send(ProcessEvent::exited(
            record.id().to_string(),
            record.status(),
            record.exit_code(),
        ));
    }
}

/// Configuration for constructing a supervisor
pub struct SupervisorConfig {
    /// Process adapter for spawning and killing processes
    pub process_adapter: Arc<dyn ProcessAdapter>,
    /// Sentinels, caps and channel sizes
    pub settings: SupervisorSettings,
}

impl SupervisorConfig {
    /// Use the given adapter with default settings
    pub fn new(process_adapter: Arc<dyn ProcessAdapter>) -> Self {
        Self {
            process_adapter,
            settings: SupervisorSettings::default(),
        }
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Spawns external commands and tracks them until they finish.
///
/// Cheap to clone; clones share the same registry. Must be used from within
/// a tokio runtime.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("running", &self.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl ProcessSupervisor {
    /// Create a supervisor from a configuration
    pub fn new(config: SupervisorConfig) -> Self {
        let SupervisorConfig {
            process_adapter,
            mut settings,
        } = config;
        // A zero cap would make every output buffer panic; treat it as unset
        settings.max_output_lines = settings.max_output_lines.filter(|cap| *cap > 0);
        let (event_tx, _event_rx) = broadcast::channel(settings.event_channel_capacity.max(1));

        Self {
            inner: Arc::new(SupervisorInner {
                adapter: process_adapter,
                settings,
                registry: Mutex::new(HashMap::new()),
                event_tx,
            }),
        }
    }

    /// Create a supervisor that runs real processes on this host
    #[cfg(unix)]
    pub fn unix(settings: SupervisorSettings) -> Self {
        Self::new(SupervisorConfig::new(Arc::new(UnixProcessAdapter::new())).with_settings(settings))
    }

    /// Settings this supervisor was built with
    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Subscribe to the event bus
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Start a command line and return its record without waiting for it
    /// to finish.
    ///
    /// The line is split on whitespace into program and arguments. If the
    /// process cannot be launched, the returned record is already terminal
    /// (`Exited`, spawn-failure exit code, diagnostic in `last_output_line`)
    /// and `on_exit` is not invoked.
    pub async fn start(&self, command_line: &str, callbacks: ProcessCallbacks) -> Arc<ProcessRecord> {
        let id = new_process_id();
        let command = command_line.trim().to_string();
        debug!("Starting process {}: {}", id, command);

        let spawned = match split_command_line(&command) {
            Ok((program, args)) => self.inner.adapter.spawn(&program, &args).await,
            Err(e) => Err(e),
        };

        match spawned {
            Ok(process) => self.launch(id, command, process, callbacks),
            Err(e) => self.register_spawn_failure(id, command, e),
        }
    }

    fn register_spawn_failure(
        &self,
        id: String,
        command: String,
        error: crate::CoreError,
    ) -> Arc<ProcessRecord> {
        let message = format!("{}: {}", SPAWN_FAILURE_PREFIX, error);
        warn!("Process {} ({}) failed to start: {}", id, command, error);

        let record = Arc::new(ProcessRecord::spawn_failed(
            id.clone(),
            command.clone(),
            self.inner.settings.spawn_failure_exit_code,
            message.clone(),
            self.inner.settings.max_output_lines,
        ));
        self.inner.registry().insert(
            id.clone(),
            RegistryEntry {
                record: record.clone(),
                callbacks: ProcessCallbacks::new(),
            },
        );
        let _ = self
            .inner
            .event_tx
            .send(ProcessEvent::spawn_failed(id, command, message));
        record
    }

    fn launch(
        &self,
        id: String,
        command: String,
        mut process: Box<dyn ManagedProcess>,
        callbacks: ProcessCallbacks,
    ) -> Arc<ProcessRecord> {
        let pid = process.pid();
        let record = Arc::new(ProcessRecord::running(
            id.clone(),
            command.clone(),
            pid,
            self.inner.settings.max_output_lines,
        ));

        self.inner.registry().insert(
            id.clone(),
            RegistryEntry {
                record: record.clone(),
                callbacks: callbacks.clone(),
            },
        );
        info!("Process {} started with pid {}: {}", id, pid, command);
        let _ = self
            .inner
            .event_tx
            .send(ProcessEvent::started(id, command, pid));

        let mut readers = Vec::with_capacity(2);
        for (stream, reader) in [
            (OutputStream::Stdout, process.take_stdout()),
            (OutputStream::Stderr, process.take_stderr()),
        ] {
            if let Some(reader) = reader {
                readers.push(tasks::spawn_output_reader(
                    record.clone(),
                    reader,
                    stream,
                    callbacks.clone(),
                    self.inner.event_tx.clone(),
                ));
            }
        }

        tasks::spawn_exit_watcher(
            self.inner.clone(),
            record.clone(),
            process,
            readers,
            callbacks,
            Duration::from_millis(self.inner.settings.output_drain_timeout_ms),
        );

        record
    }

    /// Stop a running process.
    ///
    /// Returns `false` without side effects if `id` is unknown, not running,
    /// or finished on its own first. Otherwise the record becomes
    /// `Terminated`, its completion signal fires, it is unregistered, the
    /// process is killed, and the kill call's result is returned. A process
    /// whose exit was already observed is not signalled again.
    pub fn stop(&self, id: &str) -> bool {
        let note = FinalNote {
            line: TERMINATED_MESSAGE.to_string(),
            is_error: false,
        };
        let Some(entry) = self.inner.finalize_by_id(
            id,
            ProcessStatus::Terminated,
            self.inner.settings.terminated_exit_code,
            note,
        ) else {
            debug!("Stop of {} ignored: not a running process", id);
            return false;
        };

        let killed = match entry.record.pid() {
            // Already waited for; the pid may belong to another process now
            Some(pid) if entry.record.is_reaped() => {
                debug!("Process {} (pid {}) already exited, not signalling", id, pid);
                false
            }
            Some(pid) => self.inner.adapter.kill(pid),
            None => false,
        };
        info!("Process {} stopped (kill delivered: {})", id, killed);

        entry.callbacks.notify_exit(&entry.record);
        killed
    }

    /// Look up a registered record
    pub fn get_process_info(&self, id: &str) -> Option<Arc<ProcessRecord>> {
        self.inner.registry().get(id).map(|e| e.record.clone())
    }

    /// Records that are currently running
    pub fn list_running(&self) -> Vec<Arc<ProcessRecord>> {
        self.inner
            .registry()
            .values()
            .filter(|e| e.record.is_running())
            .map(|e| e.record.clone())
            .collect()
    }

    /// Number of registered records
    pub fn len(&self) -> usize {
        self.inner.registry().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.registry().is_empty()
    }

    /// Drop registered records that are no longer running (spawn failures).
    /// Returns how many were removed.
    pub fn remove_finished(&self) -> usize {
        let mut registry = self.inner.registry();
        let before = registry.len();
        registry.retain(|_, e| e.record.is_running());
        before - registry.len()
    }

    /// Wait until every currently registered record has completed
    pub async fn wait_all(&self) {
        let records: Vec<_> = self
            .inner
            .registry()
            .values()
            .map(|e| e.record.clone())
            .collect();
        for record in records {
            record.wait().await;
        }
    }

    /// Release every registered record for shutdown.
    ///
    /// Completion signals fire with whatever exit code each record holds
    /// (usually none). Processes are neither killed nor awaited.
    pub fn dispose(&self) {
        let entries: Vec<_> = self.inner.registry().drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.record.force_complete();
        }
        info!("Supervisor disposed, released {} record(s)", entries.len());
    }
}
