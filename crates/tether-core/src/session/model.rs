//! The run-session record and its field types.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionError;

/// Lifecycle state of a run session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created and not yet ended; the owning process believes it is in
    /// flight.
    Running,
    /// Ended cleanly.
    Completed,
    /// Claimed to be running but was not the active session at scan time;
    /// the owning process died or crashed.
    Orphaned,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Orphaned => "orphaned",
        };
        f.write_str(s)
    }
}

/// Token and cost accounting for one session, with optional limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionBudget {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    /// Combined input+output token ceiling, when the caller sets one.
    pub token_limit: Option<u64>,
    pub cost_limit_usd: Option<f64>,
}

impl SessionBudget {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold one attempt's usage into the counters.
    pub fn record_usage(&mut self, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.cost_usd += cost_usd;
    }

    /// Whether any configured limit has been reached.
    pub fn exhausted(&self) -> bool {
        self.token_limit.is_some_and(|limit| self.total_tokens() >= limit)
            || self.cost_limit_usd.is_some_and(|limit| self.cost_usd >= limit)
    }
}

/// One durable record per execution attempt.
///
/// `orphaned_at` and `orphaned_reason` are present only on orphaned
/// records; completed and running records omit them entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSession {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub harness: String,
    pub project_dir: PathBuf,
    pub status: SessionStatus,
    pub current_task: Option<String>,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub budget: SessionBudget,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orphaned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orphaned_reason: Option<String>,
}

impl RunSession {
    pub(crate) fn new(
        run_id: String,
        harness: &str,
        project_dir: &Path,
        budget: SessionBudget,
    ) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            ended_at: None,
            harness: harness.to_string(),
            project_dir: project_dir.to_path_buf(),
            status: SessionStatus::Running,
            current_task: None,
            tasks_completed: 0,
            tasks_failed: 0,
            budget,
            orphaned_at: None,
            orphaned_reason: None,
        }
    }
}

/// In-place field merge for [`SessionStore::update_session`].
///
/// Unset fields leave the record untouched; `current_task` distinguishes
/// "set to this task" from "clear" from "leave alone".
///
/// [`SessionStore::update_session`]: super::SessionStore::update_session
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    current_task: Option<Option<String>>,
    tasks_completed: Option<u32>,
    tasks_failed: Option<u32>,
    budget: Option<SessionBudget>,
}

impl SessionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(Some(task.into()));
        self
    }

    pub fn clear_current_task(mut self) -> Self {
        self.current_task = Some(None);
        self
    }

    pub fn tasks_completed(mut self, count: u32) -> Self {
        self.tasks_completed = Some(count);
        self
    }

    pub fn tasks_failed(mut self, count: u32) -> Self {
        self.tasks_failed = Some(count);
        self
    }

    pub fn budget(mut self, budget: SessionBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub(crate) fn apply(self, session: &mut RunSession) {
        if let Some(task) = self.current_task {
            session.current_task = task;
        }
        if let Some(count) = self.tasks_completed {
            session.tasks_completed = count;
        }
        if let Some(count) = self.tasks_failed {
            session.tasks_failed = count;
        }
        if let Some(budget) = self.budget {
            session.budget = budget;
        }
    }
}

/// Generate a fresh run id: sortable UTC timestamp plus a short random
/// suffix so two starts within the same millisecond cannot collide.
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%S%3fZ");
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{stamp}-{}", &entropy[..8])
}

/// Reject run ids that are empty or could escape the sessions directory.
/// Malformed ids are a caller bug and fail immediately.
pub fn validate_run_id(run_id: &str) -> Result<(), SessionError> {
    if run_id.is_empty()
        || run_id.starts_with('.')
        || run_id.contains(['/', '\\'])
        || run_id.contains("..")
    {
        return Err(SessionError::InvalidRunId(run_id.to_string()));
    }
    Ok(())
}
