//! Execution orchestration
//!
//! The [`Executor`] ties the pieces together for one request: validation,
//! admission, sandbox launch, classification and the execution log.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

pub use crate::runner::classify::{classify, status_message};
pub use crate::runner::output::{TRUNCATION_MARKER, sanitize};
pub use crate::runner::project::{EntryPoint, ProjectDir, resolve_entry_point};

mod classify;
mod output;
mod project;

use crate::config::{Config, Language};
use crate::log::{ExecutionLog, FileExecutionLog, LogEntry};
use crate::sandbox::{
    AdmissionGate, DockerRuntime, GateError, ProcessSupervisor, SandboxError, SandboxRuntime,
    SandboxSource, SandboxSpec, SandboxSpecBuilder,
};
use crate::types::{ExecutionResult, ResourceLimits};

/// Errors that keep a request from producing an [`ExecutionResult`]
///
/// Program failures are not errors; they come back as results with a
/// non-success status.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The request was rejected before any sandbox resource was used
    #[error("invalid request: {0}")]
    Validation(String),

    /// No execution slot became free in time
    #[error("{0}")]
    Busy(#[from] GateError),

    /// The sandbox runtime is missing or broken
    #[error("system error: {0}")]
    System(#[from] SandboxError),
}

/// Runs untrusted programs in sandboxes
///
/// Cloning an executor shares its admission gate and log.
#[derive(Debug, Clone)]
pub struct Executor {
    config: Arc<Config>,
    gate: AdmissionGate,
    supervisor: ProcessSupervisor,
    log: Arc<dyn ExecutionLog>,
}

impl Executor {
    /// Create an executor driving the docker CLI and logging to `config.log_path`
    pub fn new(config: Config) -> Self {
        let runtime = Arc::new(DockerRuntime::new(config.docker_binary()));
        let log = Arc::new(FileExecutionLog::new(config.log_path.clone()));
        Self::with_runtime(config, runtime, log)
    }

    /// Create an executor with an explicit runtime and log
    pub fn with_runtime(
        config: Config,
        runtime: Arc<dyn SandboxRuntime>,
        log: Arc<dyn ExecutionLog>,
    ) -> Self {
        let gate = AdmissionGate::new(config.max_parallel);
        let supervisor = ProcessSupervisor::new(
            runtime,
            config.cleanup_wait(),
            config.max_output_bytes.saturating_add(1),
        );
        Self {
            config: Arc::new(config),
            gate,
            supervisor,
            log,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run a single source text piped into the language's interpreter
    ///
    /// Unknown language ids run as the default language. Sources longer than
    /// `max_source_length` characters are rejected before admission.
    #[instrument(skip(self, code, limits), fields(code_len = code.len()))]
    pub async fn execute_inline(
        &self,
        code: &str,
        language: &str,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, ExecuteError> {
        let max = self.config.max_source_length;
        if code.chars().count() > max {
            return Err(ExecuteError::Validation(format!(
                "source too long, at most {max} characters allowed"
            )));
        }

        let (language_id, lang) = self
            .config
            .language_or_default(language)
            .map_err(|e| ExecuteError::Validation(e.to_string()))?;
        let limits = self.limits_for(lang, limits)?;

        let permit = self.gate.acquire(self.config.acquire_wait()).await?;

        let spec = SandboxSpecBuilder::new(&self.config).build(lang, SandboxSource::Inline, &limits);
        let result = self
            .supervise(&spec, Some(code.as_bytes()), language_id, code, &limits)
            .await;

        permit.release();
        result
    }

    /// Run an extracted project from its entry point
    ///
    /// The entry point picks the language. A transient project directory is
    /// removed once this returns, whatever the outcome.
    #[instrument(skip(self, project, limits), fields(project = %project.path().display()))]
    pub async fn execute_archive(
        &self,
        project: ProjectDir,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, ExecuteError> {
        let entry = resolve_entry_point(project.path(), &self.config)?;
        let (language_id, lang) = self
            .config
            .get_language(&entry.language_id)
            .map_err(|e| ExecuteError::Validation(e.to_string()))?;
        if !lang.supports_archive() {
            return Err(ExecuteError::Validation(format!(
                "language '{language_id}' cannot run projects"
            )));
        }
        let limits = self.limits_for(lang, limits)?;

        let permit = self.gate.acquire(self.config.acquire_wait()).await?;

        let source = SandboxSource::Archive {
            project: &entry.project_dir,
            entry: &entry.file_name,
        };
        let spec = SandboxSpecBuilder::new(&self.config).build(lang, source, &limits);
        let reference = LogEntry::archive_source(&entry.project_dir, &entry.file_name);
        let result = self
            .supervise(&spec, None, language_id, &reference, &limits)
            .await;

        permit.release();
        drop(project);
        result
    }

    /// Check that the sandbox runtime is installed and reachable
    pub async fn probe_runtime(&self) -> Result<String, ExecuteError> {
        Ok(self.supervisor.probe().await?)
    }

    /// Look up a language the way requests do
    pub fn language(&self, id: &str) -> Option<(&str, &Language)> {
        self.config.language_or_default(id).ok()
    }

    /// Layer request limits over the configured ones, rejecting zero caps
    fn limits_for(
        &self,
        language: &Language,
        overrides: Option<&ResourceLimits>,
    ) -> Result<ResourceLimits, ExecuteError> {
        if let Some(overrides) = overrides {
            overrides.check_caps().map_err(ExecuteError::Validation)?;
        }
        let limits = self.config.effective_limits(language, overrides);
        limits.check_caps().map_err(ExecuteError::Validation)?;
        Ok(limits)
    }

    async fn supervise(
        &self,
        spec: &SandboxSpec,
        input: Option<&[u8]>,
        language_id: &str,
        source: &str,
        limits: &ResourceLimits,
    ) -> Result<ExecutionResult, ExecuteError> {
        let deadline = limits.deadline();

        let raw = match self.supervisor.run(spec, input, deadline).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(instance = spec.instance_id(), error = %e, "sandbox runtime failure");
                self.record(&LogEntry::system_error(source, e.to_string()));
                return Err(ExecuteError::System(e));
            }
        };

        let cap = self.config.max_output_bytes;
        let stdout = sanitize(&raw.stdout, cap);
        let stderr = sanitize(&raw.stderr, cap);
        let status = classify(raw.timed_out, raw.exit_code, &stdout, &stderr);

        let result = ExecutionResult {
            status,
            stdout,
            stderr,
            exit_code: raw.exit_code,
            timed_out: raw.timed_out,
            message: status_message(status, deadline.as_secs_f64()),
            language: language_id.to_string(),
            instance_id: spec.instance_id().to_string(),
            wall_time: raw.wall_time.as_secs_f64(),
        };

        info!(
            instance = %result.instance_id,
            language = %result.language,
            status = %result.status,
            exit_code = ?result.exit_code,
            wall_time = result.wall_time,
            "execution finished"
        );

        self.record(&LogEntry::from_result(source, &result));
        Ok(result)
    }

    fn record(&self, entry: &LogEntry) {
        if let Err(e) = self.log.record(entry) {
            warn!(error = %e, "failed to record execution");
        }
    }
}
