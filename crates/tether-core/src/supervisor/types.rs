//! Request, result, and configuration types for subprocess supervision.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Waits used by the escalating termination sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How long a process gets to exit after the graceful signal before
    /// the kill is escalated. Default: 2 seconds.
    pub graceful_wait: Duration,
    /// How long to wait after the forced kill before the process is
    /// written off as unkillable. Default: 1 second.
    pub kill_wait: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            graceful_wait: Duration::from_secs(2),
            kill_wait: Duration::from_secs(1),
        }
    }
}

impl SupervisorConfig {
    /// Check the lower bounds; both waits must be non-zero.
    pub fn validate(&self) -> Result<(), InvalidSupervisorConfig> {
        if self.graceful_wait.is_zero() {
            return Err(InvalidSupervisorConfig::ZeroGracefulWait);
        }
        if self.kill_wait.is_zero() {
            return Err(InvalidSupervisorConfig::ZeroKillWait);
        }
        Ok(())
    }
}

/// Rejected supervisor configuration. Raised at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSupervisorConfig {
    #[error("graceful wait must be greater than zero")]
    ZeroGracefulWait,

    #[error("kill wait must be greater than zero")]
    ZeroKillWait,
}

/// One subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Program to execute, resolved via `$PATH` when not absolute.
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables, merged over the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory; inherits the supervisor's when `None`.
    pub cwd: Option<PathBuf>,
    /// Payload written to the child's stdin, which is then closed. `None`
    /// gives the child a null stdin.
    pub stdin: Option<String>,
    /// Wall-clock limit for this invocation. `None` waits indefinitely
    /// (an outer execution guard is expected to bound it instead).
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of one supervised subprocess invocation.
///
/// `timed_out = true` implies the process was force-killed, so
/// `exit_code` is the kill status or absent. A spawn failure leaves
/// `error` populated and everything else at its zero value.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// True exactly when the child exited with code zero.
    pub success: bool,
    /// Exit code, absent when the child never exited on its own (killed,
    /// or terminated by a signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from spawn to return, escalation included.
    pub duration: Duration,
    /// The per-invocation timeout elapsed and the child was killed.
    pub timed_out: bool,
    /// Supervisor-level failure (spawn error, cancelled run); never set
    /// merely because the child exited non-zero.
    pub error: Option<String>,
}

impl ProcessResult {
    pub(crate) fn spawn_failure(program: &str, err: &std::io::Error, duration: Duration) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            timed_out: false,
            error: Some(format!("failed to spawn '{program}': {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_waits_are_sane() {
        let config = SupervisorConfig::default();
        assert_eq!(config.graceful_wait, Duration::from_secs(2));
        assert_eq!(config.kill_wait, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_waits_are_rejected() {
        let config = SupervisorConfig {
            graceful_wait: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(InvalidSupervisorConfig::ZeroGracefulWait)
        );

        let config = SupervisorConfig {
            kill_wait: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        assert_eq!(config.validate(), Err(InvalidSupervisorConfig::ZeroKillWait));
    }

    #[test]
    fn request_builder_accumulates() {
        let request = RunRequest::new("claude")
            .arg("-p")
            .args(["--output-format", "stream-json"])
            .env("AGENT_TOKEN", "t0")
            .cwd("/tmp")
            .stdin("do the task")
            .timeout(Duration::from_secs(60));

        assert_eq!(request.program, "claude");
        assert_eq!(request.args, vec!["-p", "--output-format", "stream-json"]);
        assert_eq!(request.env.get("AGENT_TOKEN").map(String::as_str), Some("t0"));
        assert_eq!(request.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(request.stdin.as_deref(), Some("do the task"));
        assert_eq!(request.timeout, Some(Duration::from_secs(60)));
    }
}
