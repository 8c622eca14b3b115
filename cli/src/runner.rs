//! Foreground execution of a single command under the supervisor

use crate::Result;
use overseer_core::id::short_id;
use overseer_core::{ProcessCallbacks, ProcessEvent, ProcessSnapshot, ProcessStatus, ProcessSupervisor};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Exit status reported when the command was stopped by `--timeout`
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit status reported when the command could not be launched
pub const NOT_STARTED_EXIT_CODE: i32 = 127;
/// Exit status reported when the command was stopped by Ctrl+C
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How to run the command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub command_line: String,
    pub timeout: Option<Duration>,
    pub json: bool,
}

/// Why the runner stopped the command itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    Interrupted,
}

/// Result of a foreground run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: ProcessSnapshot,
    pub stop_reason: Option<StopReason>,
}

impl RunOutcome {
    /// Exit status for this CLI process
    pub fn exit_code(&self) -> i32 {
        match (self.snapshot.status, self.stop_reason) {
            (ProcessStatus::Terminated, Some(StopReason::Timeout)) => TIMEOUT_EXIT_CODE,
            (ProcessStatus::Terminated, _) => INTERRUPTED_EXIT_CODE,
            _ if self.snapshot.pid.is_none() => NOT_STARTED_EXIT_CODE,
            _ => match self.snapshot.exit_code {
                Some(code) if (0..=255).contains(&code) => code,
                _ => 1,
            },
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let snap = &self.snapshot;
        let code = snap
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let mut line = format!(
            "[{}] {} {} (exit code {})",
            short_id(&snap.id),
            snap.command,
            snap.status,
            code
        );
        match self.stop_reason {
            Some(StopReason::Timeout) => line.push_str(", timed out"),
            Some(StopReason::Interrupted) => line.push_str(", interrupted"),
            None => {}
        }
        line
    }
}

/// Run `options.command_line` to completion.
///
/// Text mode echoes each line to the matching stream of this process. JSON
/// mode prints every supervisor event as one JSON object per line. The
/// command is stopped when the timeout elapses or `shutdown` resolves.
pub async fn run_command<F>(
    supervisor: &ProcessSupervisor,
    options: &RunOptions,
    shutdown: F,
) -> Result<RunOutcome>
where
    F: Future<Output = ()>,
{
    let forwarder = options.json.then(|| {
        let mut events = supervisor.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => println!("{}", json),
                            Err(e) => warn!("Failed to serialize event: {}", e),
                        }
                        if matches!(
                            event,
                            ProcessEvent::Exited { .. } | ProcessEvent::SpawnFailed { .. }
                        ) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let callbacks = if options.json {
        ProcessCallbacks::new()
    } else {
        ProcessCallbacks::new().on_output(|_, line, is_error| {
            if is_error {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        })
    };

    let record = supervisor.start(&options.command_line, callbacks).await;
    info!("Running {} as {}", record.command(), record.id());

    let stop_reason = tokio::select! {
        _ = record.wait() => None,
        _ = expire(options.timeout) => Some(StopReason::Timeout),
        _ = shutdown => Some(StopReason::Interrupted),
    };

    if let Some(reason) = stop_reason {
        info!("Stopping {} ({:?})", record.id(), reason);
        supervisor.stop(record.id());
        record.wait().await;
    }

    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }

    Ok(RunOutcome {
        snapshot: record.snapshot(),
        stop_reason: stop_reason.filter(|_| record.status() == ProcessStatus::Terminated),
    })
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(
        status: ProcessStatus,
        pid: Option<u32>,
        exit_code: Option<i32>,
        stop_reason: Option<StopReason>,
    ) -> RunOutcome {
        RunOutcome {
            snapshot: ProcessSnapshot {
                id: "0123abcd-0000-4000-8000-000000000000".into(),
                command: "job".into(),
                pid,
                status,
                exit_code,
                ..ProcessSnapshot::default()
            },
            stop_reason,
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(outcome(ProcessStatus::Exited, Some(1), Some(0), None).exit_code(), 0);
        assert_eq!(outcome(ProcessStatus::Exited, Some(1), Some(3), None).exit_code(), 3);
        assert_eq!(outcome(ProcessStatus::Exited, Some(1), Some(-1), None).exit_code(), 1);
        assert_eq!(
            outcome(ProcessStatus::Exited, None, Some(-1), None).exit_code(),
            NOT_STARTED_EXIT_CODE
        );
        assert_eq!(
            outcome(ProcessStatus::Terminated, Some(1), Some(-1), Some(StopReason::Timeout)).exit_code(),
            TIMEOUT_EXIT_CODE
        );
        assert_eq!(
            outcome(ProcessStatus::Terminated, Some(1), Some(-1), Some(StopReason::Interrupted))
                .exit_code(),
            INTERRUPTED_EXIT_CODE
        );
    }

    #[test]
    fn test_summary_mentions_stop_reason() {
        let summary =
            outcome(ProcessStatus::Terminated, Some(1), Some(-1), Some(StopReason::Timeout)).summary();
        assert!(summary.starts_with("[0123abcd] job terminated"), "{summary}");
        assert!(summary.ends_with("timed out"));
    }
}
