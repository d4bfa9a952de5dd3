//! End-to-end tests for the execution engine against a real shell.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use execd_core::{Error, SessionId};
use execd_runtime::{
    ChannelHooks, CommandEvent, CommandKernel, CommandOutcome, EngineConfig, ExecutionEngine,
    ExecutionHooks, OutputCapture, RetentionPolicy, RunOutcome, RunRequest, SessionRegistry,
    SessionRegistryExt,
};

fn engine(dir: &std::path::Path) -> ExecutionEngine {
    let config = EngineConfig {
        shell: "sh".to_string(),
        poll_interval: Duration::from_millis(10),
        completion_grace: Duration::ZERO,
        interrupt_grace: Some(Duration::from_millis(500)),
        ..EngineConfig::default()
    };
    ExecutionEngine::in_memory(OutputCapture::new(dir), config)
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CommandEvent>) -> Vec<CommandEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn stdout_lines(events: &[CommandEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            CommandEvent::Stdout(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

async fn wait_finished(engine: &ExecutionEngine, id: &SessionId) {
    for _ in 0..200 {
        if !engine.get_status(id).unwrap().running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("session {id} did not finish");
}

#[derive(Default)]
struct Recorder {
    stdout: Mutex<Vec<String>>,
    completions: Mutex<Vec<CommandOutcome>>,
}

impl ExecutionHooks for Recorder {
    fn on_stdout(&self, line: &str) {
        self.stdout.lock().unwrap().push(line.to_string());
    }

    fn on_complete(&self, outcome: &CommandOutcome) {
        self.completions.lock().unwrap().push(outcome.clone());
    }
}

#[tokio::test]
async fn test_foreground_echo_emits_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let (hooks, mut rx) = ChannelHooks::new();

    let outcome = engine
        .run(RunRequest::command("echo opensandbox-e2e").with_hooks(Arc::new(hooks)))
        .await
        .unwrap();

    let RunOutcome::Completed(outcome) = outcome else {
        panic!("foreground run detached");
    };
    assert_eq!(outcome.exit_code, Some(0));

    let events = drain(&mut rx);
    assert_eq!(stdout_lines(&events), vec!["opensandbox-e2e"]);
    assert!(!events.iter().any(|e| matches!(e, CommandEvent::Error(_))));

    let status = engine.get_status(&outcome.session_id).unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(0));
}

#[tokio::test]
async fn test_crlf_output_matches_lf_output() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let (lf_hooks, mut lf_rx) = ChannelHooks::new();
    engine
        .run(RunRequest::command("printf 'a\\nb\\nc\\n'").with_hooks(Arc::new(lf_hooks)))
        .await
        .unwrap();

    let (crlf_hooks, mut crlf_rx) = ChannelHooks::new();
    engine
        .run(RunRequest::command("printf 'a\\r\\nb\\r\\nc\\r\\n'").with_hooks(Arc::new(crlf_hooks)))
        .await
        .unwrap();

    let lf = stdout_lines(&drain(&mut lf_rx));
    let crlf = stdout_lines(&drain(&mut crlf_rx));
    assert_eq!(lf, vec!["a", "b", "c"]);
    assert_eq!(lf, crlf);
}

#[tokio::test]
async fn test_trailing_partial_line_delivered_once() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let (hooks, mut rx) = ChannelHooks::new();

    engine
        .run(
            RunRequest::command("printf 'one\\n'; sleep 0.1; printf 'tw'; sleep 0.1; printf 'o'")
                .with_hooks(Arc::new(hooks)),
        )
        .await
        .unwrap();

    assert_eq!(stdout_lines(&drain(&mut rx)), vec!["one", "two"]);
}

#[tokio::test]
async fn test_working_directory_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let (hooks, mut rx) = ChannelHooks::new();

    engine
        .run(
            RunRequest::command("pwd")
                .in_dir(workdir.path())
                .with_hooks(Arc::new(hooks)),
        )
        .await
        .unwrap();

    let lines = stdout_lines(&drain(&mut rx));
    let expected = workdir.path().canonicalize().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(
        std::path::Path::new(&lines[0]).canonicalize().unwrap(),
        expected
    );
}

#[tokio::test]
async fn test_background_lifecycle_and_seek_reconstruction() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let outcome = engine
        .run(RunRequest::background(
            "for i in 1 2 3 4 5; do echo line-$i; sleep 0.05; done; echo oops 1>&2",
        ))
        .await
        .unwrap();
    let RunOutcome::Detached(id) = outcome else {
        panic!("background run did not detach");
    };
    assert!(engine.get_status(&id).unwrap().running);

    let mut collected = Vec::new();
    let mut cursor = 0;
    loop {
        let running = engine.get_status(&id).unwrap().running;
        let chunk = engine.seek_output(&id, cursor).unwrap();
        assert_eq!(chunk.cursor, cursor + chunk.data.len() as u64);
        collected.extend_from_slice(&chunk.data);
        cursor = chunk.cursor;
        if !running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    let expected = std::fs::read(engine.capture().paths(&id).combined).unwrap();
    assert_eq!(collected, expected);
    assert_eq!(
        String::from_utf8(collected).unwrap(),
        "line-1\nline-2\nline-3\nline-4\nline-5\noops\n"
    );

    let status = engine.get_status(&id).unwrap();
    assert_eq!(status.exit_code, Some(0));
    assert!(engine.registry().inspect(&id, |k| k.is_consumed()).unwrap());

    let past_end = engine.seek_output(&id, cursor + 10).unwrap();
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.cursor, cursor + 10);
}

#[tokio::test]
async fn test_background_hooks_see_combined_output() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let recorder = Arc::new(Recorder::default());

    let outcome = engine
        .run(RunRequest::background("echo out; echo err 1>&2").with_hooks(recorder.clone()))
        .await
        .unwrap();
    wait_finished(&engine, outcome.session_id()).await;
    // Completion is recorded before the hook fires.
    for _ in 0..40 {
        if !recorder.completions.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let stdout = recorder.stdout.lock().unwrap().clone();
    assert_eq!(stdout, vec!["out", "err"]);
    let completions = recorder.completions.lock().unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].exit_code, Some(0));
}

#[tokio::test]
async fn test_background_spawn_failure_visible_in_status() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        shell: dir.path().join("missing-shell").display().to_string(),
        ..EngineConfig::default()
    };
    let engine = ExecutionEngine::in_memory(OutputCapture::new(dir.path()), config);

    let outcome = engine.run(RunRequest::background("true")).await.unwrap();
    let status = engine.get_status(outcome.session_id()).unwrap();

    assert!(!status.running);
    assert_eq!(status.exit_code, None);
    assert!(status.error.unwrap().contains("failed to spawn"));
}

#[tokio::test]
async fn test_capture_failure_leaves_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let config = EngineConfig {
        shell: "sh".to_string(),
        completion_grace: Duration::ZERO,
        ..EngineConfig::default()
    };
    let engine = ExecutionEngine::in_memory(OutputCapture::new(blocker.clone()), config);
    let id = SessionId::parse("no-capture").unwrap();

    let err = engine
        .run(RunRequest::command("true").with_session_id(id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
    assert!(!engine.registry().contains(&id));

    let err = engine
        .run(RunRequest::background("true").with_session_id(id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
    assert!(!engine.registry().contains(&id));
}

#[tokio::test]
async fn test_unknown_session_errors() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let id = SessionId::parse("does-not-exist").unwrap();

    assert!(matches!(engine.get_status(&id), Err(Error::SessionNotFound(_))));
    assert!(matches!(
        engine.seek_output(&id, 0),
        Err(Error::InvalidRequest(_))
    ));
    assert!(matches!(engine.interrupt(&id), Err(Error::SessionNotFound(_))));
}

#[tokio::test]
async fn test_interrupt_stops_background_command() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let outcome = engine.run(RunRequest::background("sleep 60")).await.unwrap();
    let id = outcome.session_id().clone();

    engine.interrupt(&id).unwrap();
    wait_finished(&engine, &id).await;

    let status = engine.get_status(&id).unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, None);
    assert!(status.error.unwrap().starts_with("terminated by signal"));

    // Second interrupt is a no-op.
    engine.interrupt(&id).unwrap();
}

#[tokio::test]
async fn test_caller_supplied_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let id = SessionId::parse("job-42").unwrap();

    let outcome = engine
        .run(RunRequest::command("exit 7").with_session_id(id.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.session_id(), &id);
    assert_eq!(engine.get_status(&id).unwrap().exit_code, Some(7));

    let again = engine
        .run(RunRequest::command("true").with_session_id(id))
        .await;
    assert!(matches!(again, Err(Error::DuplicateSession(_))));
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .run(RunRequest::command(format!("exit {i}")))
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let RunOutcome::Completed(outcome) = handle.await.unwrap() else {
            panic!("foreground run detached");
        };
        assert_eq!(outcome.exit_code, Some(i as i32));
        ids.push(outcome.session_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(engine.registry().session_ids().len(), 8);
}

#[tokio::test]
async fn test_retention_evicts_read_sessions_only() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());

    let read = engine.run(RunRequest::background("echo a")).await.unwrap();
    let unread = engine.run(RunRequest::background("echo b")).await.unwrap();
    wait_finished(&engine, read.session_id()).await;
    wait_finished(&engine, unread.session_id()).await;
    engine.seek_output(read.session_id(), 0).unwrap();

    let policy = RetentionPolicy {
        max_age: Some(Duration::ZERO),
        max_finished_sessions: None,
    };
    let later = chrono::Utc::now() + chrono::Duration::seconds(1);
    let evicted = engine.sweep(&policy, later);

    assert_eq!(evicted, vec![read.session_id().clone()]);
    assert!(!engine.capture().paths(read.session_id()).combined.exists());
    assert!(engine.get_status(unread.session_id()).is_ok());
}

#[test]
fn test_manually_constructed_kernel_status() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let id = SessionId::parse("manual").unwrap();

    let mut kernel = CommandKernel::new(id.clone(), engine.capture().paths(&id), true);
    kernel.finish(Some(1), Some("boom".to_string()));
    engine.registry().register(kernel).unwrap();

    let status = engine.get_status(&id).unwrap();
    assert!(!status.running);
    assert_eq!(status.exit_code, Some(1));
    assert_eq!(status.error.as_deref(), Some("boom"));
    assert!(status.finished_at.is_some());
}
