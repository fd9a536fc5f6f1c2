//! Subprocess supervision with guaranteed whole-tree termination.
//!
//! [`ProcessSupervisor`] spawns a harness as a child process in its own
//! process group, feeds it input, drains its output concurrently with
//! waiting for exit, and makes sure the process and everything it spawned
//! is dead before returning, whether the run ended normally, timed out,
//! or was cancelled by the caller.
//!
//! A child exiting non-zero is not an error here; it is encoded in the
//! returned [`ProcessResult`]. Only supervisor-level failures (command not
//! found, OS spawn errors) populate [`ProcessResult::error`], and even
//! those come back as a value so callers always have something to inspect.
//!
//! Platform differences are isolated behind the [`ProcessGroup`] trait:
//! POSIX targets signal the whole group, other targets can only reach the
//! direct child (see [`DirectChild`] for the documented limitation).

pub mod group;
pub mod run;
pub mod types;

pub use group::{DirectChild, ProcessGroup, default_group};
pub use run::ProcessSupervisor;
pub use types::{InvalidSupervisorConfig, ProcessResult, RunRequest, SupervisorConfig};

#[cfg(unix)]
pub use group::PosixGroup;
