//! Composition layer: one harness attempt, guarded, supervised, and
//! recorded.
//!
//! The runner wires the three reliability pieces together the way a
//! run-loop caller is expected to: start a session (recovering any
//! predecessor the last process left behind), execute attempts under the
//! guard with heartbeats flowing from the supervisor's pipe reader, keep
//! the session record current, and end the session cleanly.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backend::TaskBackend;
use crate::guard::{ExecutionGuard, GuardConfig, Trip};
use crate::hooks::{HookContext, HookEvent, HookSink};
use crate::session::{RunSession, SessionBudget, SessionError, SessionStore, SessionUpdate};
use crate::supervisor::{ProcessResult, ProcessSupervisor, RunRequest, SupervisorConfig};

/// Runs harness attempts for one project.
pub struct HarnessRunner {
    guard: ExecutionGuard,
    supervisor: ProcessSupervisor,
    store: SessionStore,
    backend: Option<Arc<dyn TaskBackend>>,
    hooks: Option<Arc<dyn HookSink>>,
}

impl HarnessRunner {
    pub fn new(
        store: SessionStore,
        guard_config: GuardConfig,
        supervisor_config: SupervisorConfig,
    ) -> Result<Self> {
        let guard = ExecutionGuard::new(guard_config).context("invalid guard configuration")?;
        let supervisor = ProcessSupervisor::new(supervisor_config)
            .context("invalid supervisor configuration")?;
        Ok(Self {
            guard,
            supervisor,
            store,
            backend: None,
            hooks: None,
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn TaskBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HookSink>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a new session and reconcile whatever the previous process
    /// invocation left behind: any record still claiming RUNNING that is
    /// no longer the active one is marked orphaned here.
    pub async fn start_session(
        &self,
        harness: &str,
        budget: Option<SessionBudget>,
    ) -> Result<RunSession> {
        let session = self
            .store
            .start_session(harness, budget, None)
            .context("failed to start run session")?;

        let orphans = self
            .store
            .detect_orphans()
            .context("orphan scan failed at session start")?;
        for orphan in &orphans {
            warn!(
                run_id = %orphan.run_id,
                started_at = %orphan.started_at,
                "recovered a session orphaned by an earlier process death"
            );
        }

        if let Some(backend) = &self.backend {
            match backend.task_counts(&session.project_dir).await {
                Ok(counts) => info!(
                    run_id = %session.run_id,
                    open = counts.open,
                    in_progress = counts.in_progress,
                    done = counts.done,
                    "task backlog at session start"
                ),
                Err(e) => warn!(error = %e, "task backend unavailable at session start"),
            }
        }

        self.emit(HookEvent::SessionStart, &session).await;
        Ok(session)
    }

    /// Execute one harness invocation under the guard. Cancellation flows
    /// downward: a trip cancels the supervisor call, which escalates
    /// termination of the subprocess tree before the trip is returned.
    pub async fn run_attempt(&self, request: &RunRequest) -> Result<ProcessResult, Trip> {
        self.guard
            .execute(|handle| async move {
                let heartbeat = handle.heartbeat_handle();
                let cancel = handle.cancellation();
                self.supervisor
                    .run_with(request, &cancel, Some(&heartbeat))
                    .await
            })
            .await
    }

    /// Record that work on a task began.
    pub async fn begin_task(&self, run_id: &str, task: &str) -> Result<RunSession, SessionError> {
        let session = self
            .store
            .update_session(run_id, SessionUpdate::new().current_task(task))?;
        self.emit(HookEvent::TaskStart, &session).await;
        Ok(session)
    }

    /// Record a task outcome: bumps the appropriate counter and clears
    /// the current task.
    pub async fn finish_task(
        &self,
        run_id: &str,
        succeeded: bool,
    ) -> Result<RunSession, SessionError> {
        let current = self.store.get_session(run_id)?;
        let update = if succeeded {
            SessionUpdate::new()
                .clear_current_task()
                .tasks_completed(current.tasks_completed + 1)
        } else {
            SessionUpdate::new()
                .clear_current_task()
                .tasks_failed(current.tasks_failed + 1)
        };
        let session = self.store.update_session(run_id, update)?;
        self.emit(HookEvent::TaskEnd, &session).await;
        Ok(session)
    }

    /// Fold one attempt's token and cost usage into the session budget.
    ///
    /// Returns the updated record; callers inspect
    /// [`SessionBudget::exhausted`] on it to decide whether to keep
    /// dispatching work.
    pub fn record_usage(
        &self,
        run_id: &str,
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: f64,
    ) -> Result<RunSession, SessionError> {
        let current = self.store.get_session(run_id)?;
        let mut budget = current.budget;
        budget.record_usage(input_tokens, output_tokens, cost_usd);
        if budget.exhausted() {
            warn!(
                run_id = %current.run_id,
                total_tokens = budget.total_tokens(),
                cost_usd = budget.cost_usd,
                "session budget exhausted"
            );
        }
        self.store
            .update_session(run_id, SessionUpdate::new().budget(budget))
    }

    /// End the session cleanly.
    pub async fn finish_session(&self, run_id: &str) -> Result<RunSession, SessionError> {
        let session = self.store.end_session(run_id)?;
        self.emit(HookEvent::SessionEnd, &session).await;
        Ok(session)
    }

    /// Notify the hook sink, if any. Sink failures are logged and
    /// swallowed; hooks must never wedge a session operation.
    async fn emit(&self, event: HookEvent, session: &RunSession) {
        if let Some(hooks) = &self.hooks {
            let context = HookContext::for_session(session);
            if let Err(e) = hooks.notify(event, &context).await {
                warn!(
                    run_id = %session.run_id,
                    event = ?event,
                    error = %e,
                    "hook sink failed"
                );
            }
        }
    }
}
