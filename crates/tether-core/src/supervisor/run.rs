//! Spawn, drain, wait, and terminate: the supervision loop itself.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::guard::Heartbeat;

use super::group::{ProcessGroup, default_group};
use super::types::{InvalidSupervisorConfig, ProcessResult, RunRequest, SupervisorConfig};

/// Runs one subprocess at a time on behalf of a caller, guaranteeing that
/// the process and its descendants are terminated before a call returns.
///
/// Every path that needs a process dead (per-invocation timeout, caller
/// cancellation, and the unconditional cleanup sweep at the end of a run)
/// funnels into the same escalating termination sequence, so there is
/// exactly one kill code path.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    group: Box<dyn ProcessGroup>,
}

impl ProcessSupervisor {
    /// Build a supervisor with the platform's process-group support.
    pub fn new(config: SupervisorConfig) -> Result<Self, InvalidSupervisorConfig> {
        Self::with_group(config, default_group())
    }

    /// Build a supervisor with an explicit [`ProcessGroup`], used by tests
    /// to observe or stub signal delivery.
    pub fn with_group(
        config: SupervisorConfig,
        group: Box<dyn ProcessGroup>,
    ) -> Result<Self, InvalidSupervisorConfig> {
        config.validate()?;
        Ok(Self { config, group })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Run a subprocess to completion without external cancellation or
    /// liveness reporting.
    pub async fn run(&self, request: &RunRequest) -> ProcessResult {
        self.run_with(request, &CancellationToken::new(), None)
            .await
    }

    /// Run a subprocess, stopping early when `cancel` fires, and pulsing
    /// `heartbeat` for every chunk of output the child produces.
    ///
    /// Never returns an `Err`-like panic: spawn failures, timeouts, and
    /// cancellations all come back inside the [`ProcessResult`].
    pub async fn run_with(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        heartbeat: Option<&Heartbeat>,
    ) -> ProcessResult {
        let start = Instant::now();

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        self.group.prepare(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %request.program, error = %err, "spawn failed");
                return ProcessResult::spawn_failure(&request.program, &err, start.elapsed());
            }
        };

        let mut stdin_pipe = child.stdin.take();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // Feed stdin and drain both output pipes concurrently with waiting
        // for exit, so a child that fills a pipe buffer cannot deadlock us.
        // The buffers live outside the raced future: output collected
        // before a timeout or cancellation survives into the result.
        let waited = {
            let io = async {
                let feed = async {
                    if let Some(mut pipe) = stdin_pipe.take() {
                        if let Some(payload) = &request.stdin {
                            let _ = pipe.write_all(payload.as_bytes()).await;
                        }
                        let _ = pipe.shutdown().await;
                        // Dropping the pipe closes it; the child sees EOF.
                    }
                };
                let (status, (), (), ()) = tokio::join!(
                    child.wait(),
                    feed,
                    drain(&mut stdout_pipe, &mut stdout_buf, heartbeat),
                    drain(&mut stderr_pipe, &mut stderr_buf, heartbeat),
                );
                status
            };
            tokio::pin!(io);
            tokio::select! {
                biased;
                () = cancel.cancelled() => Waited::Cancelled,
                () = deadline(request.timeout) => Waited::TimedOut,
                status = &mut io => Waited::Exited(status),
            }
        };

        // Single cleanup path: a no-op when the child was already reaped,
        // the full escalation otherwise.
        let reaped = self.terminate(&mut child).await;

        if reaped && !matches!(waited, Waited::Exited(_)) {
            // The writers are gone, so anything still buffered in the pipes
            // is readable up to EOF. Bounded in case a stray descendant
            // survived and still holds the write end.
            let _ = tokio::time::timeout(self.config.kill_wait, async {
                drain(&mut stdout_pipe, &mut stdout_buf, None).await;
                drain(&mut stderr_pipe, &mut stderr_buf, None).await;
            })
            .await;
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

        match waited {
            Waited::Exited(Ok(status)) => ProcessResult {
                success: status.success(),
                exit_code: status.code(),
                stdout,
                stderr,
                duration,
                timed_out: false,
                error: None,
            },
            Waited::Exited(Err(err)) => ProcessResult {
                success: false,
                exit_code: None,
                stdout,
                stderr,
                duration,
                timed_out: false,
                error: Some(format!(
                    "failed waiting on '{}': {err}",
                    request.program
                )),
            },
            Waited::TimedOut => {
                let limit = request.timeout.unwrap_or_default();
                warn!(
                    program = %request.program,
                    limit_secs = limit.as_secs_f64(),
                    "subprocess timed out, killed"
                );
                ProcessResult {
                    success: false,
                    exit_code: None,
                    stdout,
                    stderr,
                    duration,
                    timed_out: true,
                    error: Some(format!("timed out after {limit:?}")),
                }
            }
            Waited::Cancelled => {
                debug!(program = %request.program, "subprocess cancelled by caller");
                ProcessResult {
                    success: false,
                    exit_code: None,
                    stdout,
                    stderr,
                    duration,
                    timed_out: false,
                    error: Some("cancelled before completion".to_string()),
                }
            }
        }
    }

    /// Escalating termination: graceful signal, bounded wait, forced kill,
    /// bounded wait. Returns whether the child is known to be reaped; an
    /// unkillable process is logged and abandoned rather than awaited
    /// forever.
    async fn terminate(&self, child: &mut Child) -> bool {
        let Some(pid) = child.id() else {
            // Already polled to completion.
            return true;
        };

        if self.group.signal_terminate(pid) {
            match tokio::time::timeout(self.config.graceful_wait, child.wait()).await {
                Ok(_) => {
                    debug!(pid, "process group exited after graceful signal");
                    return true;
                }
                Err(_) => debug!(pid, "graceful signal ignored, escalating"),
            }
        }

        if !self.group.signal_kill(pid) {
            // No group delivery on this platform (or the group is gone);
            // fall back to the direct child handle.
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.config.kill_wait, child.wait()).await {
            Ok(_) => true,
            Err(_) => {
                error!(pid, "process survived forced kill; abandoning it");
                false
            }
        }
    }
}

enum Waited {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Sleep until the per-invocation timeout, or forever when unset.
async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Read a pipe to EOF in chunks, pulsing the heartbeat per chunk.
async fn drain<R>(pipe: &mut Option<R>, buf: &mut Vec<u8>, heartbeat: Option<&Heartbeat>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe.as_mut() else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(heartbeat) = heartbeat {
                    heartbeat.pulse();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig::default()).expect("valid default config")
    }

    #[tokio::test]
    async fn captures_stdout_of_a_successful_command() {
        let result = supervisor()
            .run(&RunRequest::new("echo").arg("hello world"))
            .await;

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello world"), "stdout: {:?}", result.stdout);
        assert!(!result.timed_out);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result_not_an_error() {
        let result = supervisor().run(&RunRequest::new("false")).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.error, None, "non-zero exit must not set error");
    }

    #[tokio::test]
    async fn captures_stderr() {
        let result = supervisor()
            .run(&RunRequest::new("sh").args(["-c", "echo oops >&2"]))
            .await;

        assert!(result.success);
        assert!(result.stderr.contains("oops"), "stderr: {:?}", result.stderr);
    }

    #[tokio::test]
    async fn missing_command_comes_back_as_a_failed_result() {
        let result = supervisor()
            .run(&RunRequest::new("this-command-does-not-exist-tether"))
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, None);
        let error = result.error.expect("spawn failure must set error");
        assert!(error.contains("failed to spawn"), "error: {error}");
    }

    #[tokio::test]
    async fn feeds_stdin_and_closes_it() {
        let result = supervisor()
            .run(&RunRequest::new("cat").stdin("from the supervisor"))
            .await;

        assert!(result.success);
        assert_eq!(result.stdout, "from the supervisor");
    }

    #[tokio::test]
    async fn merges_environment_variables() {
        let result = supervisor()
            .run(
                &RunRequest::new("sh")
                    .args(["-c", "echo $TETHER_TEST_MARKER"])
                    .env("TETHER_TEST_MARKER", "marker-value"),
            )
            .await;

        assert!(result.success);
        assert!(result.stdout.contains("marker-value"));
    }

    #[tokio::test]
    async fn respects_working_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let result = supervisor()
            .run(&RunRequest::new("pwd").cwd(tmp.path()))
            .await;

        assert!(result.success);
        let reported = std::path::PathBuf::from(result.stdout.trim());
        let expected = tmp.path().canonicalize().expect("canonicalize");
        assert_eq!(
            reported.canonicalize().unwrap_or(reported),
            expected
        );
    }

    #[tokio::test]
    async fn timeout_kills_a_sleeping_child_within_bounds() {
        let start = Instant::now();
        let result = supervisor()
            .run(
                &RunRequest::new("sleep")
                    .arg("10")
                    .timeout(Duration::from_millis(100)),
            )
            .await;

        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(result.exit_code, None, "killed child has no exit code");
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "escalation took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn cancellation_stops_the_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = supervisor()
            .run_with(&RunRequest::new("sleep").arg("10"), &cancel, None)
            .await;

        assert!(!result.success);
        assert!(!result.timed_out, "cancellation is not a timeout");
        assert_eq!(
            result.error.as_deref(),
            Some("cancelled before completion")
        );
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn output_pulses_the_heartbeat() {
        let heartbeat = Heartbeat::new();
        let result = supervisor()
            .run_with(
                &RunRequest::new("echo").arg("pulse"),
                &CancellationToken::new(),
                Some(&heartbeat),
            )
            .await;

        assert!(result.success);
        assert!(heartbeat.has_pulsed(), "stdout chunk should have pulsed");
    }

    #[tokio::test]
    async fn silent_child_never_pulses_the_heartbeat() {
        let heartbeat = Heartbeat::new();
        let result = supervisor()
            .run_with(
                &RunRequest::new("true"),
                &CancellationToken::new(),
                Some(&heartbeat),
            )
            .await;

        assert!(result.success);
        assert!(!heartbeat.has_pulsed());
    }

    /// Records delivery order and delivers nothing, forcing the direct
    /// child fallback.
    struct RecordingGroup {
        calls: std::sync::Arc<Mutex<Vec<&'static str>>>,
    }

    impl ProcessGroup for RecordingGroup {
        fn prepare(&self, _cmd: &mut Command) {}

        fn signal_terminate(&self, _pid: u32) -> bool {
            self.calls.lock().unwrap().push("terminate");
            false
        }

        fn signal_kill(&self, _pid: u32) -> bool {
            self.calls.lock().unwrap().push("kill");
            false
        }
    }

    #[tokio::test]
    async fn escalation_tries_graceful_before_forced() {
        let calls = std::sync::Arc::new(Mutex::new(Vec::new()));
        let supervisor = ProcessSupervisor::with_group(
            SupervisorConfig::default(),
            Box::new(RecordingGroup {
                calls: calls.clone(),
            }),
        )
        .expect("valid config");

        let result = supervisor
            .run(
                &RunRequest::new("sleep")
                    .arg("10")
                    .timeout(Duration::from_millis(100)),
            )
            .await;
        assert!(result.timed_out);
        assert_eq!(*calls.lock().unwrap(), vec!["terminate", "kill"]);
    }
}
