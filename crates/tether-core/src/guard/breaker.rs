//! The guard itself: races a unit of work against its deadlines.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::heartbeat::Heartbeat;
use super::types::{ExecutionOutcome, GuardConfig, InvalidGuardConfig, Trip};

/// Ceiling on how long the watchdog sleeps between staleness checks.
const WATCHDOG_INTERVAL_CEILING: Duration = Duration::from_secs(30);

/// Capabilities handed to a guarded unit of work.
///
/// Whatever drives the work (typically a streaming output reader) calls
/// [`heartbeat`](Self::heartbeat) on every sign of life, and observes the
/// [`cancellation`](Self::cancellation) token so a trip can actually stop
/// the work rather than abandon it.
#[derive(Debug, Clone)]
pub struct GuardHandle {
    heartbeat: Heartbeat,
    cancel: CancellationToken,
}

impl GuardHandle {
    /// Record a sign of life for the activity watchdog.
    pub fn heartbeat(&self) {
        self.heartbeat.pulse();
    }

    /// Clone of the underlying heartbeat handle, for wiring into a
    /// component that pulses on its own (e.g. a pipe reader).
    pub fn heartbeat_handle(&self) -> Heartbeat {
        self.heartbeat.clone()
    }

    /// Token the guard cancels when a deadline fires. The work must treat
    /// cancellation as "stop now and clean up".
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Wraps async work with an overall wall-clock ceiling and an optional
/// activity watchdog.
///
/// The guard holds only configuration; every [`execute`](Self::execute)
/// call gets its own heartbeat state and cancellation token, so one guard
/// can be shared freely.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    config: GuardConfig,
}

impl ExecutionGuard {
    /// Build a guard, rejecting zero timeouts up front.
    pub fn new(config: GuardConfig) -> Result<Self, InvalidGuardConfig> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run `work` to completion unless a deadline fires first.
    ///
    /// The work's own result, success or error, is returned unmodified
    /// when it finishes in time. On a trip the guard cancels the token in
    /// the [`GuardHandle`], waits for the work to observe the cancellation
    /// and return, discards whatever it returns, and yields the [`Trip`].
    ///
    /// When both deadlines are reached in the same poll, the overall
    /// ceiling wins.
    pub async fn execute<F, Fut, T>(&self, work: F) -> ExecutionOutcome<T>
    where
        F: FnOnce(GuardHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let heartbeat = Heartbeat::new();
        let cancel = CancellationToken::new();
        let handle = GuardHandle {
            heartbeat: heartbeat.clone(),
            cancel: cancel.clone(),
        };

        let work = work(handle);
        tokio::pin!(work);

        let overall = tokio::time::sleep(self.config.overall_timeout);
        tokio::pin!(overall);

        let watchdog = watch_activity(self.config.activity_timeout, heartbeat);
        tokio::pin!(watchdog);

        let trip = tokio::select! {
            biased;
            () = &mut overall => Trip::Overall {
                limit: self.config.overall_timeout,
            },
            output = &mut work => return Ok(output),
            limit = &mut watchdog => Trip::Activity { limit },
        };

        warn!(trip = %trip, "guarded execution tripped, cancelling work");
        cancel.cancel();

        // Wait for the cancellation to be observed. The work is expected to
        // stop its subprocess and return promptly; its result, including any
        // error it produced while shutting down, must not mask the trip.
        let _ = work.await;
        debug!("cancelled work returned");

        Err(trip)
    }
}

/// Resolves once heartbeats have gone stale, yielding the exceeded limit.
/// Pends forever when activity monitoring is disabled, and stays inert
/// until the first pulse arrives.
async fn watch_activity(activity_timeout: Option<Duration>, heartbeat: Heartbeat) -> Duration {
    let Some(limit) = activity_timeout else {
        return std::future::pending().await;
    };

    let interval = (limit / 2).min(WATCHDOG_INTERVAL_CEILING);
    loop {
        tokio::time::sleep(interval).await;
        if let Some(idle) = heartbeat.idle_for() {
            if idle >= limit {
                return limit;
            }
        }
    }
}
