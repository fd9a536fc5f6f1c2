//! Configuration and outcome types for the execution guard.

use std::time::Duration;

/// Timeouts applied to one guarded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// Hard wall-clock ceiling for the whole unit of work.
    pub overall_timeout: Duration,
    /// Maximum tolerated gap between heartbeats, once the first heartbeat
    /// has been seen. `None` disables activity monitoring entirely.
    pub activity_timeout: Option<Duration>,
}

impl GuardConfig {
    /// Build a config with only the overall ceiling.
    pub fn new(overall_timeout: Duration) -> Self {
        Self {
            overall_timeout,
            activity_timeout: None,
        }
    }

    /// Enable the activity watchdog with the given staleness limit.
    pub fn with_activity_timeout(mut self, activity_timeout: Duration) -> Self {
        self.activity_timeout = Some(activity_timeout);
        self
    }

    /// Check the lower bounds. Both timeouts must be non-zero; a zero
    /// timeout is a programming error, not a "fire immediately" request.
    pub fn validate(&self) -> Result<(), InvalidGuardConfig> {
        if self.overall_timeout.is_zero() {
            return Err(InvalidGuardConfig::ZeroOverallTimeout);
        }
        if self.activity_timeout.is_some_and(|t| t.is_zero()) {
            return Err(InvalidGuardConfig::ZeroActivityTimeout);
        }
        Ok(())
    }
}

/// Rejected guard configuration. Raised at construction time, never
/// deferred into an execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidGuardConfig {
    #[error("overall timeout must be greater than zero")]
    ZeroOverallTimeout,

    #[error("activity timeout must be greater than zero when set")]
    ZeroActivityTimeout,
}

/// A timeout mechanism fired before the work completed.
///
/// Carries which deadline was exceeded and the configured threshold, so a
/// caller can tell "the harness is computing slowly" (overall) apart from
/// "the harness is stuck and streaming nothing" (activity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Trip {
    /// The overall wall-clock ceiling elapsed.
    #[error("execution exceeded the overall time limit of {limit:?}")]
    Overall { limit: Duration },

    /// Heartbeats were flowing at some point, then stopped for longer
    /// than the configured activity timeout.
    #[error("no activity observed for longer than {limit:?}")]
    Activity { limit: Duration },
}

impl Trip {
    /// Whether this trip came from the activity watchdog rather than the
    /// overall ceiling.
    pub fn is_activity_timeout(&self) -> bool {
        matches!(self, Trip::Activity { .. })
    }

    /// The threshold that was exceeded.
    pub fn limit(&self) -> Duration {
        match self {
            Trip::Overall { limit } | Trip::Activity { limit } => *limit,
        }
    }
}

/// Result of one guarded execution: the work's own output, unmodified,
/// or the trip that cut it short.
pub type ExecutionOutcome<T> = Result<T, Trip>;
