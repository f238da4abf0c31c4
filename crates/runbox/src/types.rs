use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock deadline in seconds
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// Memory ceiling in kilobytes
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes/threads inside the sandbox
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// Size of the writable scratch tmpfs in kilobytes
    #[serde(default)]
    pub scratch_size: Option<u64>,
}

impl ResourceLimits {
    /// 1 kilobyte in kilobytes
    pub const KB: u64 = 1;
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;
    /// 1 gigabyte in kilobytes
    pub const GB: u64 = 1024 * 1024;

    /// Create new resource limits populated with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits with every field unset, useful as a base for overrides
    pub fn unset() -> Self {
        Self {
            wall_time_limit: None,
            memory_limit: None,
            max_processes: None,
            scratch_size: None,
        }
    }

    /// Set the wall clock deadline in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in kilobytes
    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the scratch area size in kilobytes
    pub fn with_scratch_size(mut self, kb: u64) -> Self {
        self.scratch_size = Some(kb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            scratch_size: overrides.scratch_size.or(self.scratch_size),
        }
    }

    /// Memory cap in kilobytes, the default cap when unset
    pub fn memory_cap(&self) -> u64 {
        self.memory_limit.unwrap_or(DEFAULT_MEMORY)
    }

    /// Process cap, the default cap when unset
    pub fn process_cap(&self) -> u32 {
        self.max_processes.unwrap_or(DEFAULT_MAX_PROCESSES)
    }

    /// Scratch area size in kilobytes, the default size when unset
    pub fn scratch_cap(&self) -> u64 {
        self.scratch_size.unwrap_or(DEFAULT_SCRATCH)
    }

    /// Reject caps the sandbox runtime would read as "unlimited"
    ///
    /// Docker treats a zero memory or pids limit as no limit at all.
    pub fn check_caps(&self) -> Result<(), String> {
        if self.memory_limit == Some(0) {
            return Err("memory_limit must be greater than 0".to_string());
        }
        if self.max_processes == Some(0) {
            return Err("max_processes must be greater than 0".to_string());
        }
        if self.scratch_size == Some(0) {
            return Err("scratch_size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// The wall clock deadline as a [`Duration`]
    ///
    /// Falls back to the default deadline when unset. Negative or NaN values
    /// clamp to zero, anything above one day clamps to one day.
    pub fn deadline(&self) -> Duration {
        let seconds = self.wall_time_limit.unwrap_or(DEFAULT_WALL_TIME);
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(MAX_DEADLINE)
            .min(MAX_DEADLINE)
    }
}

const DEFAULT_WALL_TIME: f64 = 10.0;
const DEFAULT_MEMORY: u64 = 128 * ResourceLimits::MB;
const DEFAULT_MAX_PROCESSES: u32 = 64;
const DEFAULT_SCRATCH: u64 = 16 * ResourceLimits::MB;
const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(DEFAULT_WALL_TIME),
            memory_limit: Some(DEFAULT_MEMORY),
            max_processes: Some(DEFAULT_MAX_PROCESSES),
            scratch_size: Some(DEFAULT_SCRATCH),
        }
    }
}

/// Result of an execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Classified outcome
    pub status: ExecutionStatus,

    /// Sanitized standard output
    pub stdout: String,

    /// Sanitized standard error
    pub stderr: String,

    /// Exit code, absent when the deadline fired before the process reported one
    pub exit_code: Option<i32>,

    /// Whether the wall clock deadline elapsed
    pub timed_out: bool,

    /// Explanation shown to the user for timeouts and kills
    pub message: Option<String>,

    /// Language id the program ran as
    pub language: String,

    /// Unique name of the sandbox instance
    pub instance_id: String,

    /// Wall clock time used in seconds
    pub wall_time: f64,
}

impl ExecutionResult {
    /// Check if the execution was successful (exited with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success) && self.exit_code == Some(0)
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: false,
            message: None,
            language: String::new(),
            instance_id: String::new(),
            wall_time: 0.0,
        }
    }
}

/// Status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Program exited with code 0
    #[serde(rename = "SUCCESS")]
    Success,

    /// Program exited non-zero and left diagnostics
    #[serde(rename = "RUNTIME_ERROR")]
    RuntimeError,

    /// Program exited non-zero without any output (resource limit or forced kill)
    #[serde(rename = "KILLED")]
    Killed,

    /// Wall clock deadline exceeded
    #[serde(rename = "TIMEOUT")]
    Timeout,

    /// The sandbox runtime itself failed
    #[serde(rename = "SYSTEM_ERROR")]
    SystemError,
}

impl ExecutionStatus {
    /// Label used in the execution log
    pub fn log_label(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::RuntimeError => "RUNTIME ERROR",
            ExecutionStatus::Killed => "EXECUTION STOPPED (KILLED)",
            ExecutionStatus::Timeout => "TIMEOUT",
            ExecutionStatus::SystemError => "SYSTEM ERROR",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::RuntimeError => "RUNTIME_ERROR",
            ExecutionStatus::Killed => "KILLED",
            ExecutionStatus::Timeout => "TIMEOUT",
            ExecutionStatus::SystemError => "SYSTEM_ERROR",
        };
        f.write_str(s)
    }
}

/// How the program reaches the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Source text piped through stdin
    Inline,
    /// Project directory mounted read-only
    Archive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Inline => "inline",
            SourceKind::Archive => "archive",
        }
    }
}

/// A bind mount into the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Source path on the host
    pub source: String,

    /// Target path in the sandbox
    pub target: String,

    /// Whether the mount is read-write (default: read-only)
    #[serde(default)]
    pub writable: bool,
}
