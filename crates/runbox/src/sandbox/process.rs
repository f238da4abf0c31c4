//! Process supervision for sandbox launches
//!
//! Runs the sandbox runtime as a child process, feeds it the program,
//! captures its output and enforces the wall clock deadline.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::sandbox::spec::SandboxSpec;
use crate::sandbox::{SandboxError, SandboxRuntime};

/// How long to wait for output readers after the process is gone
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// How much longer than the execution deadline a forced removal may take
const CLEANUP_MARGIN: Duration = Duration::from_secs(2);

/// Outcome of a forced termination attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The instance was removed
    Removed,
    /// There was nothing left to remove
    NotFound,
    /// The runtime reported an error
    Failed(String),
    /// The removal itself did not finish in time
    TimedOut,
}

impl CleanupOutcome {
    /// Whether the instance is known to be gone
    pub fn is_clean(&self) -> bool {
        matches!(self, CleanupOutcome::Removed | CleanupOutcome::NotFound)
    }
}

/// Raw, unclassified result of a sandbox run
#[derive(Debug, Clone)]
pub struct RawOutput {
    /// Captured stdout, at most the capture limit
    pub stdout: Vec<u8>,
    /// Captured stderr, at most the capture limit
    pub stderr: Vec<u8>,
    /// Exit code; `128 + signal` for signal deaths, `None` on timeout
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Set when a forced termination was attempted
    pub cleanup: Option<CleanupOutcome>,
    pub wall_time: Duration,
}

/// Launches sandboxes and watches them until exit or deadline
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    runtime: Arc<dyn SandboxRuntime>,
    cleanup_timeout: Duration,
    capture_limit: usize,
}

impl ProcessSupervisor {
    /// Create a supervisor
    ///
    /// `cleanup_timeout` is the least time a forced termination gets,
    /// `capture_limit` bounds the bytes kept per output stream.
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        cleanup_timeout: Duration,
        capture_limit: usize,
    ) -> Self {
        Self {
            runtime,
            cleanup_timeout,
            capture_limit,
        }
    }

    pub fn runtime(&self) -> &dyn SandboxRuntime {
        self.runtime.as_ref()
    }

    /// Run the sandbox described by `spec` until it exits or `deadline` elapses
    ///
    /// Program failures (non-zero exits, crashes, timeouts) are reported in the
    /// returned [`RawOutput`]. Errors are reserved for a broken runtime.
    #[instrument(skip(self, spec, input), fields(instance = %spec.instance_id()))]
    pub async fn run(
        &self,
        spec: &SandboxSpec,
        input: Option<&[u8]>,
        deadline: Duration,
    ) -> Result<RawOutput, SandboxError> {
        let args = self.runtime.launch_args(spec);
        debug!(?args, "launching sandbox");

        let started = Instant::now();
        let deadline_at = started + deadline;

        let mut child = spawn(&args, spec.attach_stdin())?;
        let stdout = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(capture(pipe, self.capture_limit)));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(capture(pipe, self.capture_limit)));
        let stdin = child.stdin.take();

        let waited = tokio::time::timeout_at(deadline_at, async {
            if let Some(mut pipe) = stdin {
                if let Some(data) = input
                    && let Err(e) = pipe.write_all(data).await
                {
                    // The program may exit without reading its input
                    debug!(error = %e, "sandbox stopped accepting input");
                }
                // Dropping the pipe signals EOF
                drop(pipe);
            }
            child.wait().await
        })
        .await;

        let (exit_code, timed_out, cleanup) = match waited {
            Ok(Ok(status)) => (exit_code_of(status), false, None),
            Ok(Err(e)) => return Err(SandboxError::Io(e)),
            Err(_) => {
                warn!(?deadline, "sandbox exceeded its deadline");
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "runtime client already exited");
                }
                let cleanup = self
                    .terminate_within(spec.instance_id(), self.cleanup_budget(deadline))
                    .await;
                if tokio::time::timeout(OUTPUT_GRACE, child.wait()).await.is_err() {
                    debug!("runtime client did not exit after kill");
                }
                (None, true, Some(cleanup))
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let wall_time = started.elapsed();

        if let Some(code) = exit_code
            && self.runtime.is_launch_failure(code, &stderr)
        {
            let message = String::from_utf8_lossy(&stderr).trim().to_string();
            warn!(code, %message, "sandbox runtime failed to launch");
            return Err(SandboxError::LaunchFailed { code, message });
        }

        debug!(
            ?exit_code,
            timed_out,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            ?wall_time,
            "sandbox finished"
        );

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
            cleanup,
            wall_time,
        })
    }

    /// Time allowed for removing a sandbox that ran into `deadline`
    ///
    /// Never shorter than the cleanup timeout, and always a little longer
    /// than the deadline itself.
    pub fn cleanup_budget(&self, deadline: Duration) -> Duration {
        self.cleanup_timeout
            .max(deadline.saturating_add(CLEANUP_MARGIN))
    }

    /// Forcibly remove a sandbox instance, best effort
    ///
    /// Makes exactly one attempt bounded by the cleanup timeout. Failures are
    /// logged and returned, never raised.
    pub async fn force_terminate(&self, instance_id: &str) -> CleanupOutcome {
        self.terminate_within(instance_id, self.cleanup_timeout)
            .await
    }

    #[instrument(skip(self))]
    async fn terminate_within(&self, instance_id: &str, budget: Duration) -> CleanupOutcome {
        let args = self.runtime.terminate_args(instance_id);
        debug!(?args, "forcing sandbox removal");

        let Some(program) = args.first() else {
            return CleanupOutcome::Failed("empty command arguments".to_string());
        };

        let mut removal = captured_command(program, &args[1..]);
        let outcome = match tokio::time::timeout(budget, removal.output()).await {
            Ok(Ok(output)) if output.status.success() => CleanupOutcome::Removed,
            Ok(Ok(output)) if self.runtime.is_missing_instance(&output.stderr) => {
                CleanupOutcome::NotFound
            }
            Ok(Ok(output)) => CleanupOutcome::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ),
            Ok(Err(e)) => CleanupOutcome::Failed(e.to_string()),
            Err(_) => CleanupOutcome::TimedOut,
        };

        if outcome.is_clean() {
            debug!(?outcome, "sandbox removed");
        } else {
            warn!(?outcome, "forced sandbox removal failed");
        }
        outcome
    }

    /// Check that the runtime is installed and reachable
    ///
    /// Returns the runtime's version output.
    #[instrument(skip(self))]
    pub async fn probe(&self) -> Result<String, SandboxError> {
        let args = self.runtime.probe_args();
        debug!(?args, "probing sandbox runtime");

        let program = args
            .first()
            .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;
        let mut probe = captured_command(program, &args[1..]);
        let output = tokio::time::timeout(self.cleanup_timeout, probe.output())
            .await
            .map_err(|_| SandboxError::CommandFailed("runtime probe timed out".to_string()))?
            .map_err(|e| spawn_error(program, e))?;

        if !output.status.success() {
            return Err(SandboxError::LaunchFailed {
                code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn spawn(args: &[String], attach_stdin: bool) -> Result<Child, SandboxError> {
    let program = args
        .first()
        .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;

    let stdin = if attach_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    let mut command = Command::new(program);
    command
        .args(&args[1..])
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command.spawn().map_err(|e| spawn_error(program, e))
}

/// Short-lived helper command with both output streams captured
fn captured_command(program: &str, args: &[String]) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

fn spawn_error(program: &str, e: std::io::Error) -> SandboxError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SandboxError::RuntimeNotFound(PathBuf::from(program))
    } else {
        SandboxError::SpawnFailed(e)
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes
async fn capture<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "stopped reading sandbox output");
                break;
            }
        }
    }
    kept
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = reader else {
        return Vec::new();
    };
    match tokio::time::timeout(OUTPUT_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            debug!(error = %e, "output reader failed");
            Vec::new()
        }
        Err(_) => {
            // Something else still holds the pipe open
            handle.abort();
            debug!("output reader did not finish, discarding");
            Vec::new()
        }
    }
}

fn exit_code_of(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}
