//! Background tasks attached to each running process
//!
//! Every successfully spawned process gets three tasks: one line reader per
//! output stream and one exit watcher. They share the record and race the
//! caller's `stop` through [`SupervisorInner::finalize`].

use super::adapters::{ManagedProcess, OutputReader};
use super::record::ProcessRecord;
use super::{ProcessCallbacks, SupervisorInner};
use schema::{OutputStream, ProcessEvent, ProcessStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Prefix of the synthetic stderr line recorded when a stream fails
pub const STREAM_ERROR_PREFIX: &str = "[stream error]";

/// Spawn a task that reads `reader` line by line into the record.
///
/// A read or decode error ends line capture for that stream only: one
/// synthetic stderr line is recorded and the rest of the stream is read and
/// discarded until EOF.
pub(crate) fn spawn_output_reader(
    record: Arc<ProcessRecord>,
    reader: OutputReader,
    stream: OutputStream,
    callbacks: ProcessCallbacks,
    event_tx: broadcast::Sender<ProcessEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reader = std::pin::Pin::into_inner(reader);
        let mut lines = BufReader::new(reader).lines();

        loop {
            let next = lines.next_line().await;
            match next {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    record.push_output(stream, line.clone());
                    callbacks.notify_output(&record, &line, stream.is_error());
                    // No subscribers is fine
                    let _ = event_tx.send(ProcessEvent::output(
                        record.id().to_string(),
                        stream,
                        line,
                    ));
                }
                Ok(None) => {
                    debug!("{} of process {} closed", stream, record.id());
                    break;
                }
                Err(e) => {
                    let message = format!("{} {}: {}", STREAM_ERROR_PREFIX, stream, e);
                    warn!("Process {}: {}", record.id(), message);
                    record.push_output(OutputStream::Stderr, message.clone());
                    callbacks.notify_output(&record, &message, true);
                    let _ = event_tx.send(ProcessEvent::output(
                        record.id().to_string(),
                        OutputStream::Stderr,
                        message,
                    ));
                    // Keep the pipe open until EOF so the child never sees SIGPIPE
                    let mut rest = lines.into_inner();
                    match tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
                        Ok(n) => debug!(
                            "Discarded {} byte(s) of {} from process {}",
                            n,
                            stream,
                            record.id()
                        ),
                        Err(e) => debug!(
                            "Draining {} of process {} failed: {}",
                            stream,
                            record.id(),
                            e
                        ),
                    }
                    break;
                }
            }
        }
    })
}

/// Spawn the task that waits for the process to exit and finalizes the
/// record unless a stop got there first.
///
/// Before finalizing, the reader tasks get up to `drain_timeout` to flush
/// output the process wrote just before exiting.
pub(crate) fn spawn_exit_watcher(
    inner: Arc<SupervisorInner>,
    record: Arc<ProcessRecord>,
    mut process: Box<dyn ManagedProcess>,
    readers: Vec<JoinHandle<()>>,
    callbacks: ProcessCallbacks,
    drain_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = process.wait().await;
        if outcome.is_ok() {
            record.mark_reaped();
        }
        drop(process);

        if !readers.is_empty() && !drain_timeout.is_zero() {
            let drained = tokio::time::timeout(drain_timeout, async {
                for reader in readers {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                debug!(
                    "Output of process {} still open {:?} after exit",
                    record.id(),
                    drain_timeout
                );
            }
        }

        let exit_code = match outcome {
            Ok(code) => code,
            Err(e) => {
                warn!("Waiting for process {} failed: {}", record.id(), e);
                inner.settings.wait_failure_exit_code
            }
        };

        if inner.finalize(&record, ProcessStatus::Exited, exit_code, None) {
            info!("Process {} exited with code {}", record.id(), exit_code);
            callbacks.notify_exit(&record);
        } else {
            debug!(
                "Process {} exit ({}) ignored, record already {}",
                record.id(),
                exit_code,
                record.status()
            );
        }
    })
}
