//! Unix process spawning, waiting and killing
//!
//! Processes are spawned directly (no new session or process group), with
//! stdout and stderr piped for capture and stdin closed. Killing sends
//! `SIGKILL` to the single pid; children the process may have forked are
//! not tracked.

use crate::{CoreError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A spawned child process with piped output
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status (async)
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Take the stdout handle for async reading, if available
    pub fn take_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr handle for async reading, if available
    pub fn take_stderr(&mut self) -> Option<tokio::process::ChildStderr> {
        self.child.stderr.take()
    }
}

/// Spawn a new process with piped stdout and stderr
///
/// ## Arguments
///
/// * `cmd` - The command to execute (must be in PATH or an absolute path)
/// * `args` - Command line arguments for the process
///
/// ## Example
///
/// ```rust,no_run
/// # async fn demo() -> overseer_core::Result<()> {
/// use overseer_core::process::unix::spawn;
///
/// let child = spawn("echo", &["hello", "world"])?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(cmd: &str, args: &[&str]) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", cmd, args);

    let mut command = Command::new(cmd);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", cmd, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", cmd, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned process {}", pid);

    Ok(ChildProcess { pid, child })
}

/// Send SIGKILL to a single process
///
/// ## Error Handling
///
/// Unlike a graceful shutdown helper, a missing process (`ESRCH`) is an
/// error here: the caller wants to know whether the signal was delivered.
pub fn signal_kill(pid: u32) -> Result<()> {
    let target = Pid::from_raw(pid as i32);
    debug!("Sending SIGKILL to process {}", target);

    match kill(target, Signal::SIGKILL) {
        Ok(()) => {
            debug!("Successfully sent SIGKILL to process {}", target);
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process {} already exited", target);
            Err(CoreError::ProcessSignal(format!(
                "Process {} does not exist",
                target
            )))
        }
        Err(e) => {
            error!("Failed to send SIGKILL to process {}: {}", target, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGKILL to process {}: {}",
                target, e
            )))
        }
    }
}

/// Convert an exit status into a single integer exit code.
///
/// A process killed by a signal reports `128 + signal`, the shell convention.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
