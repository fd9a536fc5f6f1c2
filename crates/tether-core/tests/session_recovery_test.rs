//! Crash-recovery behavior of the session ledger, exercised the way a
//! real restart sees it: fresh store instances over the same directory.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use tether_core::backend::{TaskBackend, TaskCounts};
use tether_core::guard::GuardConfig;
use tether_core::hooks::{HookContext, HookEvent, HookSink};
use tether_core::runner::HarnessRunner;
use tether_core::session::{SessionBudget, SessionStatus, SessionStore};
use tether_core::supervisor::{RunRequest, SupervisorConfig};

#[test]
fn restart_marks_the_crashed_session_as_orphaned() {
    let dir = tempfile::tempdir().unwrap();

    // First process: starts a session and dies without ending it.
    {
        let store = SessionStore::new(dir.path());
        store.start_session("claude-code", None, None).unwrap();
    }

    // Second process: starts its own session, then reconciles.
    let store = SessionStore::new(dir.path());
    let fresh = store.start_session("claude-code", None, None).unwrap();
    let orphans = store.detect_orphans().unwrap();

    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].status, SessionStatus::Orphaned);
    assert_ne!(orphans[0].run_id, fresh.run_id);
    assert!(orphans[0].orphaned_reason.is_some());

    let active = store.get_active_session().unwrap().unwrap();
    assert_eq!(active.run_id, fresh.run_id);
}

#[test]
fn active_session_is_visible_across_instances() {
    let dir = tempfile::tempdir().unwrap();

    let first = SessionStore::new(dir.path());
    let started = first.start_session("claude-code", None, None).unwrap();

    let second = SessionStore::new(dir.path());
    let active = second.get_active_session().unwrap().unwrap();
    assert_eq!(active.run_id, started.run_id);
}

#[test]
fn deleting_the_record_behind_the_pointer_heals_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let session = store.start_session("claude-code", None, None).unwrap();

    std::fs::remove_file(
        store
            .sessions_dir()
            .join(format!("{}.json", session.run_id)),
    )
    .unwrap();

    assert!(store.get_active_session().unwrap().is_none());
    assert!(store.get_active_session().unwrap().is_none());
}

struct CountingBackend {
    counts: TaskCounts,
    queried: Mutex<u32>,
}

#[async_trait]
impl TaskBackend for CountingBackend {
    async fn task_counts(&self, _project_dir: &Path) -> Result<TaskCounts> {
        *self.queried.lock().unwrap() += 1;
        Ok(self.counts)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(HookEvent, HookContext)>>,
}

#[async_trait]
impl HookSink for RecordingSink {
    async fn notify(&self, event: HookEvent, context: &HookContext) -> Result<()> {
        self.events.lock().unwrap().push((event, context.clone()));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl HookSink for FailingSink {
    async fn notify(&self, _event: HookEvent, _context: &HookContext) -> Result<()> {
        anyhow::bail!("hook infrastructure is down")
    }
}

fn runner_for(dir: &Path) -> HarnessRunner {
    HarnessRunner::new(
        SessionStore::new(dir),
        GuardConfig::new(Duration::from_secs(30)),
        SupervisorConfig::default(),
    )
    .expect("valid runner config")
}

#[tokio::test]
async fn runner_recovers_orphans_and_reports_boundaries() {
    let dir = tempfile::tempdir().unwrap();

    // A previous invocation died mid-session.
    let crashed = {
        let store = SessionStore::new(dir.path());
        store.start_session("claude-code", None, None).unwrap()
    };

    let backend = Arc::new(CountingBackend {
        counts: TaskCounts {
            open: 4,
            in_progress: 1,
            done: 2,
        },
        queried: Mutex::new(0),
    });
    let sink = Arc::new(RecordingSink::default());

    let runner = runner_for(dir.path())
        .with_backend(backend.clone())
        .with_hooks(sink.clone());

    let session = runner.start_session("claude-code", None).await.unwrap();

    // The crashed predecessor is now explicit audit state.
    let recovered = runner.store().get_session(&crashed.run_id).unwrap();
    assert_eq!(recovered.status, SessionStatus::Orphaned);

    // The backend was consulted for session-start context.
    assert_eq!(*backend.queried.lock().unwrap(), 1);

    // Work one task to completion and one to failure.
    runner.begin_task(&session.run_id, "T001").await.unwrap();
    let after_first = runner.finish_task(&session.run_id, true).await.unwrap();
    assert_eq!(after_first.tasks_completed, 1);
    assert_eq!(after_first.current_task, None);

    runner.begin_task(&session.run_id, "T002").await.unwrap();
    let after_second = runner.finish_task(&session.run_id, false).await.unwrap();
    assert_eq!(after_second.tasks_failed, 1);

    let finished = runner.finish_session(&session.run_id).await.unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert!(runner.store().get_active_session().unwrap().is_none());

    // Boundary events arrived in order with accurate context.
    let events = sink.events.lock().unwrap();
    let kinds: Vec<HookEvent> = events.iter().map(|(event, _)| *event).collect();
    assert_eq!(
        kinds,
        vec![
            HookEvent::SessionStart,
            HookEvent::TaskStart,
            HookEvent::TaskEnd,
            HookEvent::TaskStart,
            HookEvent::TaskEnd,
            HookEvent::SessionEnd,
        ]
    );

    let (_, first_task_start) = &events[1];
    assert_eq!(first_task_start.current_task.as_deref(), Some("T001"));

    let (_, session_end) = &events[5];
    assert_eq!(session_end.tasks_completed, 1);
    assert_eq!(session_end.tasks_failed, 1);
    assert_eq!(session_end.run_id, session.run_id);
}

#[tokio::test]
async fn failing_hook_sink_never_wedges_session_operations() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(dir.path()).with_hooks(Arc::new(FailingSink));

    let session = runner.start_session("claude-code", None).await.unwrap();
    runner.begin_task(&session.run_id, "T001").await.unwrap();
    runner.finish_task(&session.run_id, true).await.unwrap();
    let finished = runner.finish_session(&session.run_id).await.unwrap();

    assert_eq!(finished.status, SessionStatus::Completed);
}

#[tokio::test]
async fn usage_accumulates_into_the_session_budget() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(dir.path());

    let budget = SessionBudget {
        token_limit: Some(1_000),
        ..SessionBudget::default()
    };
    let session = runner
        .start_session("claude-code", Some(budget))
        .await
        .unwrap();

    let after_first = runner.record_usage(&session.run_id, 300, 200, 0.10).unwrap();
    assert_eq!(after_first.budget.total_tokens(), 500);
    assert!(!after_first.budget.exhausted());

    let after_second = runner.record_usage(&session.run_id, 400, 200, 0.10).unwrap();
    assert!(after_second.budget.exhausted());

    // Persisted, not just returned.
    let reloaded = runner.store().get_session(&session.run_id).unwrap();
    assert_eq!(reloaded.budget.total_tokens(), 1_100);
}

#[tokio::test]
async fn attempt_results_feed_session_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner_for(dir.path());

    let session = runner.start_session("claude-code", None).await.unwrap();
    runner.begin_task(&session.run_id, "T001").await.unwrap();

    let result = runner
        .run_attempt(&RunRequest::new("echo").arg("attempt output"))
        .await
        .expect("echo completes well inside the ceiling");
    assert!(result.success);

    let updated = runner
        .finish_task(&session.run_id, result.success)
        .await
        .unwrap();
    assert_eq!(updated.tasks_completed, 1);

    runner.finish_session(&session.run_id).await.unwrap();
}
