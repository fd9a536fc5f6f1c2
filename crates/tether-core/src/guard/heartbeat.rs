//! Liveness signal shared between a unit of work and the activity watchdog.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sentinel for "no pulse has ever been recorded".
const NEVER: u64 = u64::MAX;

/// A cheap-to-clone handle recording the time of the most recent sign of
/// life from a supervised unit of work.
///
/// One `Heartbeat` belongs to exactly one in-flight
/// [`ExecutionGuard::execute`](super::ExecutionGuard::execute) call; the
/// guard creates a fresh one per call and hands it to the work through the
/// [`GuardHandle`](super::GuardHandle). Internally the last pulse is a
/// single atomic scalar (milliseconds since the handle was created), so
/// writers never block the watchdog and vice versa.
///
/// The monotonic clock is used throughout; wall-clock adjustments cannot
/// produce spurious staleness.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    origin: Instant,
    last_pulse_ms: AtomicU64,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                origin: Instant::now(),
                last_pulse_ms: AtomicU64::new(NEVER),
            }),
        }
    }

    /// Record "now" as the time of the last observed activity.
    pub fn pulse(&self) {
        let elapsed =
            u64::try_from(self.inner.origin.elapsed().as_millis()).unwrap_or(NEVER - 1);
        self.inner
            .last_pulse_ms
            .store(elapsed.min(NEVER - 1), Ordering::Relaxed);
    }

    /// Whether any pulse has ever been recorded on this handle.
    pub fn has_pulsed(&self) -> bool {
        self.inner.last_pulse_ms.load(Ordering::Relaxed) != NEVER
    }

    /// Time since the last pulse, or `None` if no pulse was ever recorded.
    pub fn idle_for(&self) -> Option<Duration> {
        let last = self.inner.last_pulse_ms.load(Ordering::Relaxed);
        if last == NEVER {
            return None;
        }
        let now = u64::try_from(self.inner.origin.elapsed().as_millis()).unwrap_or(NEVER - 1);
        Some(Duration::from_millis(now.saturating_sub(last)))
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_has_no_pulse() {
        let heartbeat = Heartbeat::new();
        assert!(!heartbeat.has_pulsed());
        assert_eq!(heartbeat.idle_for(), None);
    }

    #[test]
    fn pulse_resets_idle_time() {
        let heartbeat = Heartbeat::new();
        std::thread::sleep(Duration::from_millis(30));
        heartbeat.pulse();

        let idle = heartbeat.idle_for().expect("pulsed");
        assert!(idle < Duration::from_millis(25), "idle after pulse: {idle:?}");
    }

    #[test]
    fn idle_time_grows_between_pulses() {
        let heartbeat = Heartbeat::new();
        heartbeat.pulse();
        std::thread::sleep(Duration::from_millis(40));

        let idle = heartbeat.idle_for().expect("pulsed");
        assert!(idle >= Duration::from_millis(30), "idle: {idle:?}");
    }

    #[test]
    fn clones_share_the_same_state() {
        let heartbeat = Heartbeat::new();
        let writer = heartbeat.clone();
        writer.pulse();
        assert!(heartbeat.has_pulsed());
    }
}
