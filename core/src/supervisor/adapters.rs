//! Process adapters for abstracting process management
//!
//! The supervisor depends only on this contract: `spawn` yields a handle with
//! two byte streams and an exit wait, and `kill` signals by pid. The Unix
//! adapter drives real processes; the mock adapter scripts output and exit
//! behaviour for tests.

use crate::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;
use tracing::debug;

/// Readable handle to one of a child's output streams
pub type OutputReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Trait for spawning and killing processes in a platform-agnostic way
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Spawn `program` with `args`, stdout and stderr piped
    async fn spawn(&self, program: &str, args: &[String]) -> Result<Box<dyn ManagedProcess>>;

    /// Best-effort kill by pid. Returns whether the kill was delivered; the
    /// process may already have exited.
    fn kill(&self, pid: u32) -> bool;
}

/// Trait representing a spawned process that can be awaited
#[async_trait]
pub trait ManagedProcess: Send {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit and return its exit code
    async fn wait(&mut self) -> Result<i32>;

    /// Take the child's stdout. Returns None if already taken.
    fn take_stdout(&mut self) -> Option<OutputReader>;

    /// Take the child's stderr. Returns None if already taken.
    fn take_stderr(&mut self) -> Option<OutputReader>;
}

/// Unix process adapter backed by `tokio::process` and `kill(2)`
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessAdapter;

#[cfg(unix)]
impl UnixProcessAdapter {
    /// Create a new Unix process adapter
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessAdapter for UnixProcessAdapter {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<Box<dyn ManagedProcess>> {
        use crate::process::unix;

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let child = unix::spawn(program, &args)?;

        Ok(Box::new(UnixManagedProcess { child }))
    }

    fn kill(&self, pid: u32) -> bool {
        match crate::process::unix::signal_kill(pid) {
            Ok(()) => true,
            Err(e) => {
                debug!("Kill of process {} not delivered: {}", pid, e);
                false
            }
        }
    }
}

#[cfg(unix)]
struct UnixManagedProcess {
    child: crate::process::unix::ChildProcess,
}

#[cfg(unix)]
#[async_trait]
impl ManagedProcess for UnixManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(crate::process::unix::exit_code_of(status))
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.child.take_stdout().map(|s| {
            let r: OutputReader = Box::pin(s);
            r
        })
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.child.take_stderr().map(|s| {
            let r: OutputReader = Box::pin(s);
            r
        })
    }
}

/// Exit code mock processes report after being killed (128 + SIGKILL)
pub const MOCK_KILLED_EXIT_CODE: i32 = 137;

const MOCK_PIPE_CAPACITY: usize = 64 * 1024;

/// How a mock process ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockExit {
    /// Exit with this code after the exit delay
    Code(i32),
    /// The wait itself fails after the exit delay
    WaitError(String),
    /// Never exit on its own; only a kill ends it
    UntilKilled,
}

/// Instructions for mock process behavior
#[derive(Debug, Clone)]
pub struct MockInstruction {
    /// If set, `spawn` fails with this message
    pub spawn_error: Option<String>,
    /// Raw bytes written to stdout right after spawn
    pub stdout: Vec<u8>,
    /// Raw bytes written to stderr right after spawn
    pub stderr: Vec<u8>,
    /// Line repeatedly written to stdout until the process is killed
    pub heartbeat: Option<(String, Duration)>,
    /// How the process ends
    pub exit: MockExit,
    /// How long after spawn the exit is reported
    pub exit_delay: Duration,
    /// Keep both pipes open this long after the scripted bytes, regardless
    /// of exit or kill, like a background child still holding them
    pub output_linger: Option<Duration>,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            spawn_error: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            heartbeat: None,
            exit: MockExit::Code(0),
            exit_delay: Duration::from_millis(50),
            output_linger: None,
        }
    }
}

impl MockInstruction {
    /// Exit with `code` after the default delay
    pub fn exits_with(code: i32) -> Self {
        Self {
            exit: MockExit::Code(code),
            ..Self::default()
        }
    }

    /// Run until killed
    pub fn until_killed() -> Self {
        Self {
            exit: MockExit::UntilKilled,
            ..Self::default()
        }
    }

    /// Fail to spawn with `message`
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Spawn fine, but make the exit wait fail with `message`
    pub fn wait_failure(message: impl Into<String>) -> Self {
        Self {
            exit: MockExit::WaitError(message.into()),
            ..Self::default()
        }
    }

    /// Write these lines to stdout
    pub fn with_stdout_lines(mut self, lines: &[&str]) -> Self {
        self.stdout = join_lines(lines);
        self
    }

    /// Write these lines to stderr
    pub fn with_stderr_lines(mut self, lines: &[&str]) -> Self {
        self.stderr = join_lines(lines);
        self
    }

    /// Write raw bytes to stdout
    pub fn with_raw_stdout(mut self, bytes: &[u8]) -> Self {
        self.stdout = bytes.to_vec();
        self
    }

    /// Repeat `line` on stdout every `interval` until killed
    pub fn with_heartbeat(mut self, line: impl Into<String>, interval: Duration) -> Self {
        self.heartbeat = Some((line.into(), interval));
        self
    }

    /// Report the exit after `delay`
    pub fn with_exit_delay(mut self, delay: Duration) -> Self {
        self.exit_delay = delay;
        self
    }

    /// Hold the output pipes open for `linger` after the scripted bytes
    pub fn with_output_linger(mut self, linger: Duration) -> Self {
        self.output_linger = Some(linger);
        self
    }
}

fn join_lines(lines: &[&str]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in lines {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    bytes
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock process adapter for testing
#[derive(Debug, Clone)]
pub struct MockProcessAdapter {
    /// Instructions consumed by successive spawns
    instructions: Arc<tokio::sync::Mutex<Vec<MockInstruction>>>,
    /// Kill switches of processes that have not reported an exit yet
    live: Arc<Mutex<HashMap<u32, watch::Sender<bool>>>>,
    /// Every pid passed to `kill`, in call order
    kill_calls: Arc<Mutex<Vec<u32>>>,
    /// Every `(program, args)` passed to `spawn`
    spawned: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    next_pid: Arc<AtomicU32>,
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self {
            instructions: Arc::new(tokio::sync::Mutex::new(vec![])),
            live: Arc::new(Mutex::new(HashMap::new())),
            kill_calls: Arc::new(Mutex::new(Vec::new())),
            spawned: Arc::new(Mutex::new(Vec::new())),
            next_pid: Arc::new(AtomicU32::new(10_000)),
        }
    }

    /// Add instructions for the next spawned process
    pub async fn add_instruction(&self, instruction: MockInstruction) {
        let mut instructions = self.instructions.lock().await;
        instructions.push(instruction);
    }

    /// Replace all queued instructions
    pub async fn set_instructions(&self, instructions: Vec<MockInstruction>) {
        let mut current = self.instructions.lock().await;
        *current = instructions;
    }

    /// Pids passed to `kill`, in call order
    pub fn kill_calls(&self) -> Vec<u32> {
        lock(&self.kill_calls).clone()
    }

    /// Programs and arguments passed to `spawn`
    pub fn spawned_commands(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.spawned).clone()
    }

    /// Number of mock processes that have not reported an exit yet
    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }
}

impl Default for MockProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock process for: {} {:?}", program, args);
        lock(&self.spawned).push((program.to_string(), args.to_vec()));

        let instruction = {
            let mut instructions = self.instructions.lock().await;
            if instructions.is_empty() {
                MockInstruction::default()
            } else {
                instructions.remove(0)
            }
        };

        if let Some(message) = instruction.spawn_error {
            return Err(CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': {}",
                program, message
            )));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let (kill_tx, kill_rx) = watch::channel(false);
        lock(&self.live).insert(pid, kill_tx);

        let (stdout_reader, stdout_writer) = tokio::io::duplex(MOCK_PIPE_CAPACITY);
        let (stderr_reader, stderr_writer) = tokio::io::duplex(MOCK_PIPE_CAPACITY);

        let hold_open = instruction.heartbeat.is_some() || instruction.exit == MockExit::UntilKilled;
        tokio::spawn(write_mock_stream(
            stdout_writer,
            instruction.stdout,
            instruction.heartbeat,
            hold_open,
            instruction.output_linger,
            kill_rx.clone(),
        ));
        tokio::spawn(write_mock_stream(
            stderr_writer,
            instruction.stderr,
            None,
            hold_open,
            instruction.output_linger,
            kill_rx.clone(),
        ));

        Ok(Box::new(MockManagedProcess {
            pid,
            exit: instruction.exit,
            exit_delay: instruction.exit_delay,
            kill_rx,
            live: self.live.clone(),
            stdout: Some(stdout_reader),
            stderr: Some(stderr_reader),
        }))
    }

    fn kill(&self, pid: u32) -> bool {
        debug!("Killing mock process {}", pid);
        lock(&self.kill_calls).push(pid);
        let live = lock(&self.live);
        match live.get(&pid) {
            Some(tx) => !tx.send_replace(true),
            None => false,
        }
    }
}

/// Feed one mock pipe. The write end is dropped (EOF) once the scripted
/// bytes are written, after the linger if one is set, or on kill when the
/// stream is held open.
async fn write_mock_stream(
    mut writer: DuplexStream,
    bytes: Vec<u8>,
    heartbeat: Option<(String, Duration)>,
    hold_open: bool,
    linger: Option<Duration>,
    mut kill_rx: watch::Receiver<bool>,
) {
    if !bytes.is_empty() && writer.write_all(&bytes).await.is_err() {
        return;
    }
    if let Some(linger) = linger {
        tokio::time::sleep(linger).await;
        return;
    }
    if !hold_open {
        return;
    }
    match heartbeat {
        Some((line, interval)) => loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let payload = format!("{line}\n");
                    if writer.write_all(payload.as_bytes()).await.is_err() {
                        return;
                    }
                }
                _ = wait_killed(&mut kill_rx) => return,
            }
        },
        None => wait_killed(&mut kill_rx).await,
    }
}

/// Resolve once the kill switch is set (or its sender is gone)
async fn wait_killed(kill_rx: &mut watch::Receiver<bool>) {
    let _ = kill_rx.wait_for(|killed| *killed).await;
}

/// Mock managed process for testing
struct MockManagedProcess {
    pid: u32,
    exit: MockExit,
    exit_delay: Duration,
    kill_rx: watch::Receiver<bool>,
    live: Arc<Mutex<HashMap<u32, watch::Sender<bool>>>>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<i32> {
        let mut killed = self.kill_rx.clone();
        let delay = self.exit_delay;

        let outcome = match &self.exit {
            MockExit::UntilKilled => {
                wait_killed(&mut killed).await;
                Ok(MOCK_KILLED_EXIT_CODE)
            }
            MockExit::Code(code) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(*code),
                    _ = wait_killed(&mut killed) => Ok(MOCK_KILLED_EXIT_CODE),
                }
            }
            MockExit::WaitError(message) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_killed(&mut killed) => {}
                }
                Err(CoreError::ProcessWait(message.clone()))
            }
        };

        lock(&self.live).remove(&self.pid);
        outcome
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.stdout.take().map(|s| {
            let r: OutputReader = Box::pin(s);
            r
        })
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.stderr.take().map(|s| {
            let r: OutputReader = Box::pin(s);
            r
        })
    }
}
