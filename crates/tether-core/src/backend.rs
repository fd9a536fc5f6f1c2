//! Task-backend collaborator interface.
//!
//! The reliability core does not read or write task records itself; a
//! backend implemented elsewhere supplies the backlog shape so a session
//! can be started with context (and so operators see what a crashed run
//! left behind).

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Backlog counts for a project at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub open: u32,
    pub in_progress: u32,
    pub done: u32,
}

impl TaskCounts {
    pub fn total(&self) -> u32 {
        self.open + self.in_progress + self.done
    }
}

/// Read-only view of the task backlog, implemented by the task backend.
///
/// Object-safe so a runner can hold `Arc<dyn TaskBackend>`.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Current backlog counts for the project.
    async fn task_counts(&self, project_dir: &Path) -> Result<TaskCounts>;
}
