//! Process-group capability: how a platform groups a child with its
//! descendants and delivers signals to the whole group.
//!
//! The supervisor's termination algorithm is platform-agnostic; only the
//! signal delivery differs. Implementations report whether a signal was
//! actually delivered so the caller can fall back to killing the direct
//! child handle.

use tokio::process::Command;

/// Signal delivery for a spawned child and its descendants.
///
/// Selected once at supervisor construction ([`default_group`]) and
/// injectable for tests.
pub trait ProcessGroup: Send + Sync {
    /// Arrange, before spawn, for the child to lead its own group so
    /// descendants can be signalled together.
    fn prepare(&self, cmd: &mut Command);

    /// Deliver the graceful termination signal to the group. Returns
    /// `false` when the platform has no such signal or delivery failed.
    fn signal_terminate(&self, pid: u32) -> bool;

    /// Deliver the forced kill to the group. Returns `false` when
    /// undeliverable; the supervisor then kills the direct child only.
    fn signal_kill(&self, pid: u32) -> bool;
}

/// POSIX groups: `setsid` at spawn, `kill(-pgid, ...)` for delivery.
///
/// The child becomes a session leader, so SIGTERM/SIGKILL reach every
/// descendant that has not moved itself into another group.
#[cfg(unix)]
pub struct PosixGroup;

#[cfg(unix)]
impl ProcessGroup for PosixGroup {
    fn prepare(&self, cmd: &mut Command) {
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    fn signal_terminate(&self, pid: u32) -> bool {
        signal_group(pid, libc::SIGTERM)
    }

    fn signal_kill(&self, pid: u32) -> bool {
        signal_group(pid, libc::SIGKILL)
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: i32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Negative pid addresses the whole process group.
    unsafe { libc::kill(-pid, signal) == 0 }
}

/// Fallback for platforms without POSIX process groups.
///
/// No group is formed and no graceful signal exists, so termination only
/// reaches the direct child: grandchildren spawned by the harness survive
/// a kill. This is a known limitation of the fallback path, not something
/// the supervisor papers over.
pub struct DirectChild;

impl ProcessGroup for DirectChild {
    fn prepare(&self, _cmd: &mut Command) {}

    fn signal_terminate(&self, _pid: u32) -> bool {
        false
    }

    fn signal_kill(&self, _pid: u32) -> bool {
        false
    }
}

/// The group implementation for the current platform.
pub fn default_group() -> Box<dyn ProcessGroup> {
    #[cfg(unix)]
    {
        Box::new(PosixGroup)
    }
    #[cfg(not(unix))]
    {
        Box::new(DirectChild)
    }
}
