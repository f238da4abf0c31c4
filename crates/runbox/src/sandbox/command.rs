//! Command builder for the docker CLI
//!
//! Builds command-line arguments for launching, removing and probing
//! sandbox containers.

use std::path::{Path, PathBuf};

use crate::sandbox::spec::{SandboxSpec, ScratchMount};
use crate::types::MountConfig;

/// Builder for docker command-line arguments
#[derive(Debug)]
pub struct DockerCommand {
    /// Path to the docker CLI
    docker_path: PathBuf,
    /// One of run, rm, version
    action: DockerAction,
    /// --name
    name: Option<String>,
    image: String,
    /// --network=none
    network_disabled: bool,
    /// --memory / --memory-swap, in kilobytes
    memory_limit: Option<u64>,
    /// --pids-limit
    max_processes: Option<u32>,
    /// --read-only
    read_only: bool,
    /// --cap-drop=ALL
    drop_capabilities: bool,
    /// --security-opt=no-new-privileges
    no_new_privileges: bool,
    /// --tmpfs
    scratch: Option<ScratchMount>,
    /// --volume
    mounts: Vec<MountConfig>,
    /// --user
    user: Option<String>,
    /// --interactive
    interactive: bool,
    command: Vec<String>,
}

impl DockerCommand {
    /// Create a new docker command builder
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
            action: DockerAction::Run,
            name: None,
            image: String::new(),
            network_disabled: false,
            memory_limit: None,
            max_processes: None,
            read_only: false,
            drop_capabilities: false,
            no_new_privileges: false,
            scratch: None,
            mounts: Vec::new(),
            user: None,
            interactive: false,
            command: Vec::new(),
        }
    }

    /// Create a run command carrying the full hardening policy of `spec`
    pub fn from_spec(docker_path: impl Into<PathBuf>, spec: &SandboxSpec) -> Self {
        let mut cmd = Self::new(docker_path)
            .action(DockerAction::Run)
            .name(spec.instance_id())
            .image(spec.image())
            .network_disabled(spec.network_disabled())
            .read_only(spec.read_only_root())
            .drop_capabilities(spec.drop_capabilities())
            .no_new_privileges(spec.no_new_privileges())
            .scratch(spec.scratch().clone())
            .mounts(spec.mounts().iter().cloned())
            .interactive(spec.attach_stdin())
            .command(spec.command().iter().cloned());
        cmd.memory_limit = Some(spec.memory_limit());
        cmd.max_processes = Some(spec.max_processes());
        cmd.user = spec.user().map(str::to_owned);
        cmd
    }

    /// Set the action to perform
    pub fn action(mut self, action: DockerAction) -> Self {
        self.action = action;
        self
    }

    /// Set the container name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the image to run
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Disable networking
    pub fn network_disabled(mut self, disabled: bool) -> Self {
        self.network_disabled = disabled;
        self
    }

    /// Set the memory limit in kilobytes
    pub fn memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the process count limit
    pub fn max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Mount the root filesystem read-only
    pub fn read_only(mut self, enable: bool) -> Self {
        self.read_only = enable;
        self
    }

    /// Drop every Linux capability
    pub fn drop_capabilities(mut self, enable: bool) -> Self {
        self.drop_capabilities = enable;
        self
    }

    /// Forbid privilege escalation through setuid binaries
    pub fn no_new_privileges(mut self, enable: bool) -> Self {
        self.no_new_privileges = enable;
        self
    }

    /// Add a writable tmpfs scratch area
    pub fn scratch(mut self, scratch: ScratchMount) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Add a bind mount
    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Add multiple bind mounts
    pub fn mounts(mut self, mounts: impl IntoIterator<Item = MountConfig>) -> Self {
        self.mounts.extend(mounts);
        self
    }

    /// Run as the given user
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Keep stdin open so the program can be piped in
    pub fn interactive(mut self, enable: bool) -> Self {
        self.interactive = enable;
        self
    }

    /// Set the command to run inside the container
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.docker_path.to_string_lossy().into_owned()];

        match self.action {
            DockerAction::Version => {
                args.push("version".to_string());
                args.push("--format".to_string());
                args.push("{{.Server.Version}}".to_string());
            }
            DockerAction::Remove => {
                args.push("rm".to_string());
                args.push("--force".to_string());
                if let Some(name) = self.name {
                    args.push(name);
                }
            }
            DockerAction::Run => {
                args.push("run".to_string());
                args.push("--rm".to_string());

                if let Some(ref name) = self.name {
                    args.push(format!("--name={name}"));
                }

                // Isolation
                if self.network_disabled {
                    args.push("--network=none".to_string());
                }
                if let Some(memory) = self.memory_limit {
                    args.push(format!("--memory={memory}k"));
                    // Equal swap limit keeps the program from spilling into swap
                    args.push(format!("--memory-swap={memory}k"));
                }
                if let Some(procs) = self.max_processes {
                    args.push(format!("--pids-limit={procs}"));
                }
                if self.read_only {
                    args.push("--read-only".to_string());
                }
                if self.drop_capabilities {
                    args.push("--cap-drop=ALL".to_string());
                }
                if self.no_new_privileges {
                    args.push("--security-opt=no-new-privileges".to_string());
                }
                if let Some(ref scratch) = self.scratch {
                    args.push(format!(
                        "--tmpfs={}:rw,size={}k",
                        scratch.target, scratch.size
                    ));
                }

                // Mounts
                for mount in &self.mounts {
                    let mode = if mount.writable { "rw" } else { "ro" };
                    args.push(format!("--volume={}:{}:{mode}", mount.source, mount.target));
                }

                if let Some(ref user) = self.user {
                    args.push(format!("--user={user}"));
                }
                if self.interactive {
                    args.push("--interactive".to_string());
                }

                // Image and command
                args.push(self.image);
                args.extend(self.command);
            }
        }

        args
    }

    /// Get the docker CLI path
    pub fn docker_path(&self) -> &Path {
        &self.docker_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerAction {
    /// Start a container and wait for it
    Run,
    /// Forcibly remove a container
    Remove,
    /// Query the daemon version
    Version,
}
