//! Append-only execution log
//!
//! Every execution that reaches the sandbox leaves one self-delimited text
//! block: time, status, return code, the submitted source and both output
//! streams.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;

use crate::types::{ExecutionResult, ExecutionStatus};

const SEPARATOR: &str = "----------------------------";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to write execution log at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One execution as it appears in the log
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub status: ExecutionStatus,
    /// Submitted source, or `ARCHIVE <dir> (<entry>)` for projects
    pub source: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
}

impl LogEntry {
    /// Entry for a completed execution
    pub fn from_result(source: impl Into<String>, result: &ExecutionResult) -> Self {
        let error = match (&result.message, result.stderr.is_empty()) {
            (Some(message), true) => message.clone(),
            (Some(message), false) => format!("{}\n{message}", result.stderr),
            (None, _) => result.stderr.clone(),
        };
        Self {
            timestamp: Local::now(),
            status: result.status,
            source: source.into(),
            exit_code: result.exit_code,
            output: result.stdout.clone(),
            error,
        }
    }

    /// Entry for an execution the sandbox runtime could not carry out
    pub fn system_error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            status: ExecutionStatus::SystemError,
            source: source.into(),
            exit_code: None,
            output: String::new(),
            error: message.into(),
        }
    }

    /// Source reference recorded for archive executions
    pub fn archive_source(project_dir: &Path, entry: &str) -> String {
        format!("ARCHIVE {} ({entry})", project_dir.display())
    }

    /// Render the entry as a log block, trailing newline included
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SEPARATOR}")?;
        writeln!(f, "TIME: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "STATUS: {}", self.status.log_label())?;
        writeln!(f, "RETURN CODE: {}", self.exit_code.unwrap_or(-1))?;
        writeln!(f)?;
        writeln!(f, "USER CODE:")?;
        writeln!(f, "{}", self.source)?;
        writeln!(f)?;
        writeln!(f, "OUTPUT:")?;
        writeln!(f, "{}", self.output)?;
        writeln!(f)?;
        writeln!(f, "ERROR:")?;
        writeln!(f, "{}", self.error)?;
        writeln!(f, "{SEPARATOR}")
    }
}

/// Sink for execution records
pub trait ExecutionLog: fmt::Debug + Send + Sync {
    /// Append one entry
    fn record(&self, entry: &LogEntry) -> Result<(), LogError>;
}

/// Log appended to a text file
///
/// Writers are serialized so concurrent executions never interleave blocks.
#[derive(Debug)]
pub struct FileExecutionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileExecutionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole log, empty if nothing was recorded yet
    pub fn read_history(&self) -> Result<String, LogError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::read_to_string(&self.path) {
            Ok(history) => Ok(history),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ExecutionLog for FileExecutionLog {
    fn record(&self, entry: &LogEntry) -> Result<(), LogError> {
        let block = entry.render();
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(block.as_bytes())
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), status = %entry.status, "recorded execution");
        Ok(())
    }
}

/// Log kept in memory
#[derive(Debug, Default)]
pub struct MemoryExecutionLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ExecutionLog for MemoryExecutionLog {
    fn record(&self, entry: &LogEntry) -> Result<(), LogError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}
