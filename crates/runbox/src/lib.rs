//! A library for running untrusted code in hardened containers.
//!
//! Runbox accepts source snippets or small extracted projects and runs them
//! inside throwaway docker containers, returning the captured output with a
//! classified outcome.
//!
//! # Features
//!
//! - **Hardened sandboxes**: no network, read-only root, dropped capabilities,
//!   memory and process ceilings, a small tmpfs scratch area.
//! - **Bounded concurrency**: an admission gate caps running sandboxes and
//!   rejects requests that cannot get a slot in time.
//! - **Deadlines**: every run has a wall clock deadline; timed-out sandboxes
//!   are force-removed by name.
//! - **Stable outcomes**: `SUCCESS`, `RUNTIME_ERROR`, `KILLED`, `TIMEOUT`,
//!   `SYSTEM_ERROR`.
//! - **Execution log**: an append-only record of every run.
//! - **TOML configuration**: images, commands, entry points and limits per
//!   language.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use log::{ExecutionLog, FileExecutionLog, LogEntry, LogError, MemoryExecutionLog};
pub use runner::{EntryPoint, ExecuteError, Executor, ProjectDir};
pub use sandbox::{
    AdmissionGate, CleanupOutcome, DockerRuntime, GateError, Permit, ProcessSupervisor,
    SandboxError, SandboxRuntime, SandboxSpec, SandboxSpecBuilder,
};
pub use types::{ExecutionResult, ExecutionStatus, MountConfig, ResourceLimits, SourceKind};

pub mod config;
pub mod log;
pub mod runner;
pub mod sandbox;
pub mod types;
