//! Hook-invocation collaborator interface.
//!
//! Hooks themselves (shell commands, notifications, whatever the operator
//! wires up) live outside this core. The core's job is to say *when* a
//! boundary was crossed and to supply accurate context for it.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::session::RunSession;

/// Session and task boundaries a hook sink can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    SessionEnd,
    TaskStart,
    TaskEnd,
}

/// Context supplied with every hook invocation, derived from the session
/// record at the moment the boundary is crossed.
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub run_id: String,
    pub harness: String,
    /// Time since the session started; for ended or orphaned sessions,
    /// the span up to that point.
    pub elapsed: Duration,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub current_task: Option<String>,
}

impl HookContext {
    pub fn for_session(session: &RunSession) -> Self {
        let end = session
            .ended_at
            .or(session.orphaned_at)
            .unwrap_or_else(Utc::now);
        let elapsed = (end - session.started_at).to_std().unwrap_or_default();

        Self {
            run_id: session.run_id.clone(),
            harness: session.harness.clone(),
            elapsed,
            tasks_completed: session.tasks_completed,
            tasks_failed: session.tasks_failed,
            current_task: session.current_task.clone(),
        }
    }
}

/// Receiver for boundary notifications, implemented elsewhere.
///
/// Failures are the sink's own business: the runner logs them and moves
/// on, so a broken hook can never wedge a session.
#[async_trait]
pub trait HookSink: Send + Sync {
    async fn notify(&self, event: HookEvent, context: &HookContext) -> Result<()>;
}
