//! Project directories and entry point resolution

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Config;
use crate::runner::ExecuteError;

/// An extracted project directory handed to the executor
///
/// A transient directory is deleted when this value is dropped, whatever
/// the outcome of the execution. A borrowed directory is left in place.
#[derive(Debug)]
pub struct ProjectDir {
    path: PathBuf,
    transient: bool,
}

impl ProjectDir {
    /// Take ownership of a directory that is removed after execution
    pub fn transient(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transient: true,
        }
    }

    /// Use a directory without taking ownership of it
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transient: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl Drop for ProjectDir {
    fn drop(&mut self) {
        if !self.transient {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed project directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove project directory"
            ),
        }
    }
}

/// The file an archive execution starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Language the entry point selects
    pub language_id: String,
    /// File name relative to the project root
    pub file_name: String,
    /// Canonical project directory
    pub project_dir: PathBuf,
}

/// Find the entry point of a project
///
/// Languages are probed in `archive_entry_order`; the first one whose entry
/// file exists as a regular file at the project root wins. Symlinks are not
/// followed.
pub fn resolve_entry_point(dir: &Path, config: &Config) -> Result<EntryPoint, ExecuteError> {
    let project_dir = dir.canonicalize().map_err(|e| {
        ExecuteError::Validation(format!(
            "project directory {} is not accessible: {e}",
            dir.display()
        ))
    })?;
    if !project_dir.is_dir() {
        return Err(ExecuteError::Validation(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    for language_id in &config.archive_entry_order {
        let Some(language) = config.languages.get(language_id) else {
            continue;
        };
        let Some(ref file_name) = language.entry_point else {
            continue;
        };

        let candidate = project_dir.join(file_name);
        let is_file = std::fs::symlink_metadata(&candidate)
            .map(|meta| meta.file_type().is_file())
            .unwrap_or(false);
        if is_file {
            debug!(language = %language_id, entry = %file_name, "resolved entry point");
            return Ok(EntryPoint {
                language_id: language_id.clone(),
                file_name: file_name.clone(),
                project_dir,
            });
        }
    }

    let expected: Vec<&str> = config
        .archive_entry_order
        .iter()
        .filter_map(|id| config.languages.get(id)?.entry_point.as_deref())
        .collect();
    Err(ExecuteError::Validation(format!(
        "no recognized entry point found (expected one of: {})",
        expected.join(", ")
    )))
}
