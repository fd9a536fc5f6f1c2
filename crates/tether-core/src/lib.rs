//! Reliability layer for supervising long-running coding-agent harnesses.
//!
//! A harness is an opaque, potentially misbehaving child process: it may
//! hang forever or stream output without ever finishing, and the parent
//! may die while it is mid-flight. Three components, composed bottom-up,
//! make that safe:
//!
//! - [`supervisor::ProcessSupervisor`] spawns a child in its own process
//!   group and guarantees the whole tree is terminated on timeout or
//!   cancellation.
//! - [`guard::ExecutionGuard`] races a unit of work against an overall
//!   wall-clock ceiling and a heartbeat-driven activity watchdog, turning
//!   a hang into a typed [`guard::Trip`] instead of an indefinite wait.
//! - [`session::SessionStore`] keeps one durable JSON record per
//!   execution attempt, an atomic active-session pointer, and an orphan
//!   scan that converts crash debris into explicit audit state.
//!
//! [`runner::HarnessRunner`] composes the three for the common case;
//! [`backend`] and [`hooks`] are the narrow interfaces through which the
//! surrounding system (task storage, hook execution) plugs in.

pub mod backend;
pub mod config;
pub mod guard;
pub mod hooks;
pub mod runner;
pub mod session;
pub mod supervisor;

// Re-export the primary public API at the crate root.
pub use backend::{TaskBackend, TaskCounts};
pub use config::Config;
pub use guard::{ExecutionGuard, ExecutionOutcome, GuardConfig, GuardHandle, Heartbeat, Trip};
pub use hooks::{HookContext, HookEvent, HookSink};
pub use runner::HarnessRunner;
pub use session::{
    RunSession, SessionBudget, SessionError, SessionStatus, SessionStore, SessionUpdate,
};
pub use supervisor::{ProcessResult, ProcessSupervisor, RunRequest, SupervisorConfig};
