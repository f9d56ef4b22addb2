//! Session evaluation: fault recovery, async tasks, interruption and snapshots

use crate::integration::test_utils::test_session;
use parking_lot::Mutex;
use rhai::Dynamic;
use rivet::config::SessionConfig;
use rivet::context::LoadingScope;
use rivet::engine::FaultKind;
use rivet::error::SessionError;
use rivet::report::{EnvironmentObserver, EnvironmentSnapshot};
use rivet::session::{InterruptOutcome, NoopListener, SerializerState, Task, TaskListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct EndCounter(AtomicUsize);

impl TaskListener for EndCounter {
    fn task_ended(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SnapshotRecorder(Mutex<Vec<EnvironmentSnapshot>>);

impl EnvironmentObserver for SnapshotRecorder {
    fn environment_updated(&self, snapshot: &EnvironmentSnapshot) {
        self.0.lock().push(snapshot.clone());
    }
}

#[test]
fn test_script_fault_does_not_poison_session() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    assert_eq!(session.evaluate("1 + 1", &[]).unwrap().as_int(), Ok(2));
    let err = session.evaluate("undefined_var", &[]).unwrap_err();
    assert_eq!(err.as_fault().map(|f| f.kind), Some(FaultKind::Script));
    assert_eq!(session.evaluate("2 + 2", &[]).unwrap().as_int(), Ok(4));
}

#[test]
fn test_evaluate_before_first_build_is_not_ready() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    assert!(matches!(
        session.evaluate_async("1", "early", Arc::new(NoopListener), Vec::new()),
        Err(SessionError::EngineNotReady)
    ));
}

#[test]
fn test_async_evaluation_echoes_value_and_prints() {
    let project = TempDir::new().unwrap();
    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    transcript.clear();

    let listener = Arc::new(EndCounter::default());
    let handle = session
        .evaluate_async(
            "print(\"working\"); base * 2",
            "double",
            listener.clone(),
            vec![("base".to_string(), Dynamic::from(21_i64))],
        )
        .unwrap();
    assert_eq!(handle.join().unwrap().as_int(), Ok(42));

    assert_eq!(transcript.outputs(), vec!["working".to_string(), "42".to_string()]);
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_interrupt_stops_running_loop() {
    let project = TempDir::new().unwrap();
    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    let listener = Arc::new(EndCounter::default());
    let handle = session
        .evaluate_async("loop { }", "spin", listener.clone(), Vec::new())
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while session.state() != SerializerState::Running && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(session.interrupt(), InterruptOutcome::Cooperative);
    let err = handle.join().unwrap_err();
    assert_eq!(err.as_fault().map(|f| f.kind), Some(FaultKind::Engine));
    assert_eq!(session.state(), SerializerState::Idle);
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    assert!(!session.context().unwrap().is_possibly_corrupted());
    assert!(!transcript.warnings().is_empty());

    assert_eq!(session.evaluate("5", &[]).unwrap().as_int(), Ok(5));
}

#[test]
fn test_interrupt_wakes_sleeping_script() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    let handle = session
        .evaluate_async("sleep(30000)", "nap", Arc::new(NoopListener), Vec::new())
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !handle.control().is_waiting() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    assert_eq!(session.interrupt(), InterruptOutcome::Cooperative);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(handle.join().is_err());
}

fn wait_for_state(session: &rivet::session::Session, state: SerializerState) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while session.state() != state && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_contending_submission_runs_alongside_busy_task() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    let busy = session
        .evaluate_async(
            "let t = timestamp(); while t.elapsed < 1.5 {} let finished = true; 1",
            "busy",
            Arc::new(NoopListener),
            Vec::new(),
        )
        .unwrap();
    wait_for_state(&session, SerializerState::Running);
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let contender = session
        .evaluate_async("let sum = 1 + 1; sum", "contender", Arc::new(NoopListener), Vec::new())
        .unwrap();
    assert_eq!(contender.join().unwrap().as_int(), Ok(2));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(busy.join().unwrap().as_int(), Ok(1));
    assert!(!session.context().unwrap().is_possibly_corrupted());
    assert_eq!(session.evaluate("sum", &[]).unwrap().as_int(), Ok(2));
    assert!(session.fetch_variable("finished").unwrap().is_some());
}

#[test]
fn test_evaluate_while_task_sleeps() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();

    let sleeper = session
        .evaluate_async("sleep(1500); 5", "nap", Arc::new(NoopListener), Vec::new())
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !sleeper.control().is_waiting() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    assert_eq!(session.evaluate("2 + 2", &[]).unwrap().as_int(), Ok(4));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(sleeper.join().unwrap().as_int(), Ok(5));
}

#[cfg(unix)]
#[test]
fn test_forced_interrupt_flags_context_and_warns() {
    let project = TempDir::new().unwrap();
    let fifo = project.path().join("never-written");
    let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());

    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    session.add_variable("kept", Dynamic::from(9_i64)).unwrap();

    // Opening a fifo with no writer blocks outside the engine, so cancellation is never seen.
    let listener = Arc::new(EndCounter::default());
    let handle = session
        .evaluate_async(
            format!("read_text({:?})", fifo.display().to_string()),
            "blocked read",
            listener.clone(),
            Vec::new(),
        )
        .unwrap();
    wait_for_state(&session, SerializerState::Running);
    let prompts = transcript.prompt_count();

    let started = Instant::now();
    assert_eq!(session.interrupt(), InterruptOutcome::Forced);
    let elapsed = started.elapsed();
    assert!(elapsed >= rivet::session::INTERRUPT_GRACE_PERIOD);
    assert!(elapsed < Duration::from_secs(3));

    assert_eq!(session.state(), SerializerState::Idle);
    assert!(session.context().unwrap().is_possibly_corrupted());
    assert!(transcript
        .warnings()
        .iter()
        .any(|w| w.contains("session state may be inconsistent")));
    assert!(transcript.prompt_count() > prompts);
    assert_eq!(listener.0.load(Ordering::SeqCst), 1);

    // The abandoned task still holds the scope; evaluation carries on over a copy.
    assert_eq!(session.evaluate("kept + 1", &[]).unwrap().as_int(), Ok(10));

    // Release the blocked reader so the worker thread ends.
    drop(std::fs::OpenOptions::new().write(true).open(&fifo).unwrap());
    let _ = handle.join_timeout(Duration::from_secs(2));
}

#[test]
fn test_observers_see_new_bindings() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    let recorder = Arc::new(SnapshotRecorder::default());
    session.add_observer(recorder.clone());
    session.rebuild_context_blocking().unwrap();

    session
        .evaluate_async("let answer = 42;", "bind", Arc::new(NoopListener), Vec::new())
        .unwrap()
        .join()
        .unwrap();

    let snapshots = recorder.0.lock();
    let latest = snapshots.last().unwrap();
    assert_eq!(latest.get("answer").and_then(|v| v.as_int().ok()), Some(42));
    assert_eq!(latest.generation(), session.context().unwrap().generation());
}

#[test]
fn test_restart_marks_transcript_and_clears_bindings() {
    let project = TempDir::new().unwrap();
    let (session, transcript) = test_session(&project, SessionConfig::default());
    session.rebuild_context_blocking().unwrap();
    session.evaluate("let leftover = 1;", &[]).unwrap();

    session.restart().unwrap().join().unwrap();
    assert!(transcript
        .outputs()
        .iter()
        .any(|line| line == "[Session restarted]"));
    assert!(session.fetch_variable("leftover").unwrap().is_none());
}

#[test]
fn test_submitted_task_sees_its_bindings() {
    let project = TempDir::new().unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.set_binding("unit", Dynamic::from("ms".to_string()));
    session.rebuild_context_blocking().unwrap();

    let handle = session
        .submit(
            Task::new("format", "`${amount}${unit}`")
                .with_binding("amount", Dynamic::from(250_i64)),
        )
        .unwrap();
    let value = handle.join_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(value.to_string(), "250ms");

    assert!(session.remove_binding("unit").is_some());
    session.rebuild_context_blocking().unwrap();
    assert!(session.evaluate("unit", &[]).is_err());
}

#[test]
fn test_base_scope_modules_survive_rebuilds() {
    let project = TempDir::new().unwrap();
    let modules = TempDir::new().unwrap();
    std::fs::write(modules.path().join("units.rhai"), "fn kb(n) { n * 1024 }").unwrap();
    let (session, _) = test_session(&project, SessionConfig::default());
    session.set_base_scope(LoadingScope::from_dirs(vec![modules.path().to_path_buf()]));

    for _ in 0..2 {
        session.rebuild_context_blocking().unwrap();
        let value = session
            .evaluate(r#"import "units" as u; u::kb(2)"#, &[])
            .unwrap();
        assert_eq!(value.as_int(), Ok(2048));
    }
}
