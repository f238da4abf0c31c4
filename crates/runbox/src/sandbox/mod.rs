//! Container sandbox driver
//!
//! This module turns an execution request into a hardened container launch,
//! limits how many containers run at once, and supervises each container
//! until it exits or its deadline fires.
//!
//! The container runtime is reached through the [`SandboxRuntime`] trait;
//! [`DockerRuntime`] drives the `docker` CLI.
//!
//! References for the docker CLI flags used here:
//! - https://docs.docker.com/reference/cli/docker/container/run/
//! - https://docs.docker.com/reference/cli/docker/container/rm/

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::sandbox::command::{DockerAction, DockerCommand};
pub use crate::sandbox::gate::{AdmissionGate, GateError, Permit};
pub use crate::sandbox::process::{CleanupOutcome, ProcessSupervisor, RawOutput};
pub use crate::sandbox::spec::{SandboxSource, SandboxSpec, SandboxSpecBuilder, ScratchMount};

mod command;
mod gate;
mod process;
mod spec;

/// Errors raised by the sandbox driver itself
///
/// These describe a broken host (runtime missing, daemon unreachable), never a
/// failure of the sandboxed program.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox runtime not found at {0}")]
    RuntimeNotFound(PathBuf),

    #[error("failed to spawn sandbox runtime: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("sandbox runtime failed to start the sandbox (exit code {code}): {message}")]
    LaunchFailed { code: i32, message: String },

    #[error("sandbox command failed: {0}")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The container runtime seam
///
/// Implementations translate sandbox requests into command lines; the
/// [`ProcessSupervisor`] owns spawning, deadlines and cleanup.
pub trait SandboxRuntime: fmt::Debug + Send + Sync {
    /// Command line that launches the sandbox described by `spec`
    fn launch_args(&self, spec: &SandboxSpec) -> Vec<String>;

    /// Command line that forcibly removes the sandbox named `instance_id`
    fn terminate_args(&self, instance_id: &str) -> Vec<String>;

    /// Command line that checks the runtime is installed and reachable
    fn probe_args(&self) -> Vec<String>;

    /// Whether a completed launch actually failed inside the runtime
    /// rather than inside the sandboxed program
    fn is_launch_failure(&self, _exit_code: i32, _stderr: &[u8]) -> bool {
        false
    }

    /// Whether a failed termination only reported that the instance is gone
    fn is_missing_instance(&self, _stderr: &[u8]) -> bool {
        false
    }
}

/// Exit code docker uses when the daemon or the CLI itself failed
const DOCKER_RUN_FAILURE: i32 = 125;

/// [`SandboxRuntime`] backed by the docker CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker_path: PathBuf,
}

impl DockerRuntime {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    /// Path to the docker CLI
    pub fn docker_path(&self) -> &std::path::Path {
        &self.docker_path
    }
}

impl SandboxRuntime for DockerRuntime {
    fn launch_args(&self, spec: &SandboxSpec) -> Vec<String> {
        DockerCommand::from_spec(&self.docker_path, spec).build()
    }

    fn terminate_args(&self, instance_id: &str) -> Vec<String> {
        DockerCommand::new(&self.docker_path)
            .action(DockerAction::Remove)
            .name(instance_id)
            .build()
    }

    fn probe_args(&self) -> Vec<String> {
        DockerCommand::new(&self.docker_path)
            .action(DockerAction::Version)
            .build()
    }

    fn is_launch_failure(&self, exit_code: i32, stderr: &[u8]) -> bool {
        // A program inside the container may exit with 125 as well; docker's
        // own failures are prefixed with "docker:".
        if exit_code != DOCKER_RUN_FAILURE {
            return false;
        }
        let stderr = String::from_utf8_lossy(stderr);
        stderr.trim_start().starts_with("docker:")
            || stderr.contains("Cannot connect to the Docker daemon")
    }

    fn is_missing_instance(&self, stderr: &[u8]) -> bool {
        String::from_utf8_lossy(stderr).contains("No such container")
    }
}
