//! Lifecycle tests for the supervisor against the mock adapter
//!
//! These cover natural exits, spawn and wait failures, stream errors,
//! explicit stops, disposal and the event bus.

use super::{eventually, mock_supervisor, mock_supervisor_with, wait_done};
use crate::supervisor::{
    MockInstruction, MockProcessAdapter, ProcessCallbacks, SPAWN_FAILURE_PREFIX,
    STREAM_ERROR_PREFIX, TERMINATED_MESSAGE,
};
use crate::SupervisorSettings;
use schema::{OutputStream, ProcessEvent, ProcessStatus};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn counting_exit(counter: &Arc<AtomicUsize>) -> ProcessCallbacks {
    let counter = counter.clone();
    ProcessCallbacks::new().on_exit(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_natural_exit_captures_output() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(MockInstruction::exits_with(0).with_stdout_lines(&["hello", "  world  "]))
        .await;
    let supervisor = mock_supervisor(&adapter);
    let exits = Arc::new(AtomicUsize::new(0));

    let record = supervisor.start("echo hello", counting_exit(&exits)).await;
    assert!(record.pid().is_some());

    assert_eq!(wait_done(&record).await, Some(0));
    assert_eq!(record.status(), ProcessStatus::Exited);
    assert_eq!(record.exit_code(), Some(0));
    assert_eq!(record.stdout_lines(), vec!["hello", "world"]);
    assert!(record.stderr_lines().is_empty());
    assert_eq!(record.last_output_line().as_deref(), Some("world"));
    assert!(!record.is_error_output());

    assert!(supervisor.get_process_info(record.id()).is_none());
    assert!(supervisor.is_empty());
    assert!(eventually(|| exits.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_nonzero_exit_code() {
    let adapter = MockProcessAdapter::new();
    adapter.add_instruction(MockInstruction::exits_with(3)).await;
    let supervisor = mock_supervisor(&adapter);

    let record = supervisor.start("false", ProcessCallbacks::new()).await;
    assert_eq!(wait_done(&record).await, Some(3));
    assert_eq!(record.status(), ProcessStatus::Exited);
    assert!(!record.snapshot().is_success());
}

#[tokio::test]
async fn test_command_line_is_split_on_whitespace() {
    let adapter = MockProcessAdapter::new();
    let supervisor = mock_supervisor(&adapter);

    let record = supervisor.start("  sh   -c \t 'echo hi'  ", ProcessCallbacks::new()).await;
    wait_done(&record).await;

    assert_eq!(record.command(), "sh   -c \t 'echo hi'");
    assert_eq!(
        adapter.spawned_commands(),
        vec![(
            "sh".to_string(),
            vec!["-c".to_string(), "'echo".to_string(), "hi'".to_string()]
        )]
    );
}

#[tokio::test]
async fn test_spawn_failure_yields_terminal_record() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(MockInstruction::spawn_failure("No such file or directory"))
        .await;
    let supervisor = mock_supervisor(&adapter);
    let mut events = supervisor.subscribe();
    let exits = Arc::new(AtomicUsize::new(0));

    let record = supervisor.start("no-such-binary-xyz", counting_exit(&exits)).await;

    assert_eq!(record.status(), ProcessStatus::Exited);
    assert_eq!(record.exit_code(), Some(-1));
    assert!(record.is_error_output());
    assert!(record.is_completed());
    assert!(record.pid().is_none());
    let message = record.last_output_line().expect("diagnostic");
    assert!(message.starts_with(SPAWN_FAILURE_PREFIX), "{message}");
    assert!(message.contains("No such file or directory"));
    assert_eq!(wait_done(&record).await, Some(-1));

    // Still resolvable, but not running and not stoppable
    let found = supervisor.get_process_info(record.id()).expect("registered");
    assert!(Arc::ptr_eq(&found, &record));
    assert!(supervisor.list_running().is_empty());
    assert!(!supervisor.stop(record.id()));

    match events.try_recv().expect("event") {
        ProcessEvent::SpawnFailed { process_id, .. } => assert_eq!(process_id, record.id()),
        other => panic!("unexpected event {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(exits.load(Ordering::SeqCst), 0, "on_exit must not fire for spawn failures");

    assert_eq!(supervisor.remove_finished(), 1);
    assert!(supervisor.get_process_info(record.id()).is_none());
}

#[tokio::test]
async fn test_empty_command_line_never_reaches_adapter() {
    let adapter = MockProcessAdapter::new();
    let supervisor = mock_supervisor(&adapter);

    let record = supervisor.start("   ", ProcessCallbacks::new()).await;
    assert_eq!(record.status(), ProcessStatus::Exited);
    assert_eq!(record.exit_code(), Some(-1));
    assert!(adapter.spawned_commands().is_empty());
}

#[tokio::test]
async fn test_custom_sentinels() {
    let adapter = MockProcessAdapter::new();
    adapter
        .set_instructions(vec![
            MockInstruction::spawn_failure("denied"),
            MockInstruction::wait_failure("waitpid: EINTR"),
        ])
        .await;
    let settings = SupervisorSettings {
        spawn_failure_exit_code: -127,
        wait_failure_exit_code: -7,
        ..SupervisorSettings::default()
    };
    let supervisor = mock_supervisor_with(&adapter, settings);
    let exits = Arc::new(AtomicUsize::new(0));

    let failed = supervisor.start("denied", ProcessCallbacks::new()).await;
    assert_eq!(failed.exit_code(), Some(-127));

    let flaky = supervisor.start("flaky", counting_exit(&exits)).await;
    assert_eq!(wait_done(&flaky).await, Some(-7));
    assert_eq!(flaky.status(), ProcessStatus::Exited);
    assert!(eventually(|| exits.load(Ordering::SeqCst) == 1).await);
    assert!(supervisor.get_process_info(flaky.id()).is_none());
}

#[tokio::test]
async fn test_stream_error_is_recorded_as_stderr() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(MockInstruction::exits_with(0).with_raw_stdout(b"ok\n\xff\xfe bad\nnever\n"))
        .await;
    let supervisor = mock_supervisor(&adapter);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callbacks = ProcessCallbacks::new().on_output(move |_, line, is_error| {
        sink.lock().unwrap().push((line.to_string(), is_error));
    });

    let record = supervisor.start("decoder", callbacks).await;
    assert_eq!(wait_done(&record).await, Some(0));
    assert_eq!(record.status(), ProcessStatus::Exited);

    assert_eq!(record.stdout_lines(), vec!["ok"]);
    let stderr = record.stderr_lines();
    assert_eq!(stderr.len(), 1);
    assert!(stderr[0].starts_with(STREAM_ERROR_PREFIX), "{}", stderr[0]);
    assert!(record.is_error_output());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("ok".to_string(), false));
    assert!(seen[1].1);
}

#[tokio::test]
async fn test_stop_running_process() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(
            MockInstruction::until_killed().with_heartbeat("tick", Duration::from_millis(10)),
        )
        .await;
    let supervisor = mock_supervisor(&adapter);
    let exits = Arc::new(AtomicUsize::new(0));
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let counter = exits.clone();
    let callbacks = ProcessCallbacks::new()
        .on_output(move |_, line, _| {
            let _ = line_tx.send(line.to_string());
        })
        .on_exit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let record = supervisor.start("yes tick", callbacks).await;
    let first = timeout(Duration::from_secs(2), line_rx.recv())
        .await
        .expect("no output")
        .expect("channel closed");
    assert_eq!(first, "tick");
    assert_eq!(supervisor.list_running().len(), 1);

    assert!(supervisor.stop(record.id()));

    assert_eq!(record.status(), ProcessStatus::Terminated);
    assert_eq!(record.exit_code(), Some(-1));
    assert_eq!(record.last_output_line().as_deref(), Some(TERMINATED_MESSAGE));
    assert!(!record.is_error_output());
    assert!(supervisor.get_process_info(record.id()).is_none());
    assert_eq!(adapter.kill_calls(), vec![record.pid().unwrap()]);
    assert_eq!(wait_done(&record).await, Some(-1));

    // Second stop is a no-op
    assert!(!supervisor.stop(record.id()));
    assert_eq!(adapter.kill_calls().len(), 1);

    // The exit watcher sees the kill later and must not touch the record
    assert!(eventually(|| adapter.live_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(record.status(), ProcessStatus::Terminated);
    assert_eq!(record.exit_code(), Some(-1));
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_unknown_id_has_no_effect() {
    let adapter = MockProcessAdapter::new();
    adapter.add_instruction(MockInstruction::until_killed()).await;
    let supervisor = mock_supervisor(&adapter);
    let record = supervisor.start("sleep 100", ProcessCallbacks::new()).await;

    assert!(!supervisor.stop("never-issued"));
    assert!(adapter.kill_calls().is_empty());
    assert!(record.is_running());
    assert_eq!(supervisor.len(), 1);

    assert!(supervisor.stop(record.id()));
}

#[tokio::test]
async fn test_dispose_releases_without_killing() {
    let adapter = MockProcessAdapter::new();
    adapter
        .set_instructions(vec![MockInstruction::until_killed(), MockInstruction::until_killed()])
        .await;
    let supervisor = mock_supervisor(&adapter);
    let a = supervisor.start("sleep 100", ProcessCallbacks::new()).await;
    let b = supervisor.start("sleep 200", ProcessCallbacks::new()).await;
    assert_eq!(supervisor.list_running().len(), 2);

    supervisor.dispose();

    assert!(supervisor.is_empty());
    assert_eq!(wait_done(&a).await, None);
    assert_eq!(wait_done(&b).await, None);
    assert!(a.is_running(), "dispose does not change status");
    assert!(adapter.kill_calls().is_empty());
    assert_eq!(adapter.live_count(), 2);
    assert!(!supervisor.stop(a.id()));
}

#[tokio::test]
async fn test_ids_are_pairwise_distinct() {
    let adapter = MockProcessAdapter::new();
    let supervisor = mock_supervisor(&adapter);
    let mut ids = HashSet::new();
    for _ in 0..50 {
        let record = supervisor.start("true", ProcessCallbacks::new()).await;
        assert!(ids.insert(record.id().to_string()));
    }
    supervisor.wait_all().await;
    assert!(supervisor.is_empty());
}

#[tokio::test]
async fn test_output_cap_from_settings() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(MockInstruction::exits_with(0).with_stdout_lines(&["1", "2", "3", "4"]))
        .await;
    let settings = SupervisorSettings {
        max_output_lines: Some(2),
        ..SupervisorSettings::default()
    };
    let supervisor = mock_supervisor_with(&adapter, settings);

    let record = supervisor.start("seq 4", ProcessCallbacks::new()).await;
    wait_done(&record).await;
    let snap = record.snapshot();
    assert_eq!(snap.stdout_lines, vec!["3", "4"]);
    assert_eq!(snap.stdout_dropped, 2);
}

#[tokio::test]
async fn test_event_bus_sequence() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(
            MockInstruction::exits_with(0)
                .with_stdout_lines(&["a", "b"])
                .with_stderr_lines(&["warn"]),
        )
        .await;
    let supervisor = mock_supervisor(&adapter);
    let mut events = supervisor.subscribe();

    let record = supervisor.start("job", ProcessCallbacks::new()).await;
    wait_done(&record).await;

    let mut collected = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(200), events.recv()).await {
        let done = matches!(event, ProcessEvent::Exited { .. });
        collected.push(event);
        if done {
            break;
        }
    }

    assert!(matches!(collected.first(), Some(ProcessEvent::Started { .. })));
    match collected.last() {
        Some(ProcessEvent::Exited {
            status, exit_code, ..
        }) => {
            assert_eq!(*status, ProcessStatus::Exited);
            assert_eq!(*exit_code, Some(0));
        }
        other => panic!("expected Exited last, got {other:?}"),
    }

    let stdout: Vec<_> = collected
        .iter()
        .filter_map(|e| match e {
            ProcessEvent::Output {
                stream: OutputStream::Stdout,
                line,
                ..
            } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stdout, vec!["a", "b"]);
    assert!(collected.iter().all(|e| e.process_id() == record.id()));
}

#[tokio::test]
async fn test_callbacks_can_reenter_supervisor() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(MockInstruction::exits_with(0).with_stdout_lines(&["x"]))
        .await;
    let supervisor = mock_supervisor(&adapter);
    let observed = Arc::new(Mutex::new(Vec::new()));

    let sup = supervisor.clone();
    let sink = observed.clone();
    let callbacks = ProcessCallbacks::new().on_output(move |record, _, _| {
        let registered = sup.get_process_info(record.id()).is_some();
        sink.lock().unwrap().push(registered);
    });

    let record = supervisor.start("echo x", callbacks).await;
    wait_done(&record).await;
    assert_eq!(*observed.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_stop_after_exit_observed_does_not_signal_pid() {
    let adapter = MockProcessAdapter::new();
    adapter
        .add_instruction(
            MockInstruction::exits_with(0)
                .with_stdout_lines(&["bg"])
                .with_exit_delay(Duration::from_millis(10))
                .with_output_linger(Duration::from_millis(300)),
        )
        .await;
    let settings = SupervisorSettings {
        output_drain_timeout_ms: 2_000,
        ..SupervisorSettings::default()
    };
    let supervisor = mock_supervisor_with(&adapter, settings);
    let exits = Arc::new(AtomicUsize::new(0));

    let record = supervisor.start("spawner", counting_exit(&exits)).await;
    // Exit reported, readers still draining the lingering pipes
    assert!(eventually(|| adapter.live_count() == 0).await);
    assert!(record.is_running());

    assert!(!supervisor.stop(record.id()));
    assert!(adapter.kill_calls().is_empty());
    assert_eq!(record.status(), ProcessStatus::Terminated);
    assert_eq!(wait_done(&record).await, Some(-1));
    assert!(supervisor.get_process_info(record.id()).is_none());

    // The watcher finishes draining and loses the finalize
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(record.status(), ProcessStatus::Terminated);
    assert_eq!(exits.load(Ordering::SeqCst), 1);
}
