//! Dual-timeout execution guard for supervised units of work.
//!
//! This module wraps an arbitrary async unit of work (typically "run a
//! harness to completion" via [`crate::supervisor::ProcessSupervisor`])
//! with two independent timeout mechanisms:
//!
//! - an **overall** wall-clock ceiling, which always applies, and
//! - an optional **activity** watchdog, armed by the first [`Heartbeat`]
//!   pulse, which trips when the work keeps running but stops showing
//!   signs of life.
//!
//! A trip is a typed value ([`Trip`]), not a panic or an abandoned task:
//! the guard cancels the work through a [`CancellationToken`], waits for
//! the cancellation to be observed, and only then returns.
//!
//! ```text
//! ExecutionGuard::execute(work)
//!     |
//!     v
//! work(GuardHandle { heartbeat, cancel })
//!     |                          race
//!     +-- overall sleep ---------+
//!     +-- activity watchdog -----+--> first winner decides the outcome
//!     +-- the work itself -------+
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod breaker;
pub mod heartbeat;
pub mod types;

pub use breaker::{ExecutionGuard, GuardHandle};
pub use heartbeat::Heartbeat;
pub use types::{ExecutionOutcome, GuardConfig, InvalidGuardConfig, Trip};
