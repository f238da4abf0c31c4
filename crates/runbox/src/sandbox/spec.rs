//! Sandbox launch specifications
//!
//! A [`SandboxSpec`] is the complete, immutable description of one sandbox
//! launch: which image and command to run and the hardening policy around
//! it. Specs are built fresh for every execution attempt.

use std::path::Path;

use uuid::Uuid;

use crate::config::{Config, Language, PROJECT_MOUNT_TARGET};
use crate::types::{MountConfig, ResourceLimits, SourceKind};

/// Writable tmpfs area inside an otherwise read-only sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchMount {
    /// Mount point inside the sandbox
    pub target: String,
    /// Size in kilobytes
    pub size: u64,
}

/// Where the program comes from
#[derive(Debug, Clone, Copy)]
pub enum SandboxSource<'a> {
    /// Program text is piped through stdin
    Inline,
    /// Pre-validated project directory with a resolved entry point file
    Archive { project: &'a Path, entry: &'a str },
}

impl SandboxSource<'_> {
    pub fn kind(&self) -> SourceKind {
        match self {
            SandboxSource::Inline => SourceKind::Inline,
            SandboxSource::Archive { .. } => SourceKind::Archive,
        }
    }
}

/// Ready-to-launch description of an isolated process
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    instance_id: String,
    kind: SourceKind,
    image: String,
    command: Vec<String>,
    memory_limit: u64,
    max_processes: u32,
    scratch: ScratchMount,
    user: Option<String>,
    mounts: Vec<MountConfig>,
}

impl SandboxSpec {
    /// Globally unique instance name, the handle for forced termination
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Command run inside the sandbox
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Networking is never available to sandboxed code
    pub fn network_disabled(&self) -> bool {
        true
    }

    /// Memory ceiling in kilobytes
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn max_processes(&self) -> u32 {
        self.max_processes
    }

    /// The root filesystem is always mounted read-only
    pub fn read_only_root(&self) -> bool {
        true
    }

    pub fn scratch(&self) -> &ScratchMount {
        &self.scratch
    }

    /// All capabilities are always dropped
    pub fn drop_capabilities(&self) -> bool {
        true
    }

    /// Privilege escalation is always forbidden
    pub fn no_new_privileges(&self) -> bool {
        true
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Read-only project mounts (archive executions only)
    pub fn mounts(&self) -> &[MountConfig] {
        &self.mounts
    }

    /// Whether the program is fed through stdin
    pub fn attach_stdin(&self) -> bool {
        self.kind == SourceKind::Inline
    }
}

/// Builds [`SandboxSpec`]s from configuration
#[derive(Debug, Clone, Copy)]
pub struct SandboxSpecBuilder<'a> {
    config: &'a Config,
}

impl<'a> SandboxSpecBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build a spec with a freshly generated instance id
    ///
    /// Limits left unset fall back to the built-in caps, so every spec
    /// carries a memory cap, a process cap and a sized scratch area.
    pub fn build(
        &self,
        language: &Language,
        source: SandboxSource<'_>,
        limits: &ResourceLimits,
    ) -> SandboxSpec {
        let instance_id = new_instance_id(&self.config.instance_prefix, source.kind());
        self.build_with_id(language, source, limits, instance_id)
    }

    /// Build a spec with a caller-chosen instance id
    pub fn build_with_id(
        &self,
        language: &Language,
        source: SandboxSource<'_>,
        limits: &ResourceLimits,
        instance_id: String,
    ) -> SandboxSpec {
        let (command, mounts) = match source {
            SandboxSource::Inline => (language.inline_command.clone(), Vec::new()),
            SandboxSource::Archive { project, entry } => {
                let command =
                    Language::expand_command(&language.archive_command, &Language::entry_path(entry));
                let mount = MountConfig {
                    source: project.to_string_lossy().into_owned(),
                    target: PROJECT_MOUNT_TARGET.to_string(),
                    writable: false,
                };
                (command, vec![mount])
            }
        };

        SandboxSpec {
            instance_id,
            kind: source.kind(),
            image: language.image.clone(),
            command,
            memory_limit: limits.memory_cap(),
            max_processes: limits.process_cap(),
            scratch: ScratchMount {
                target: "/tmp".to_string(),
                size: limits.scratch_cap(),
            },
            user: self.config.user.clone(),
            mounts,
        }
    }
}

/// Generate a unique sandbox instance name
pub fn new_instance_id(prefix: &str, kind: SourceKind) -> String {
    format!("{prefix}-{}-{}", kind.as_str(), Uuid::new_v4().simple())
}
