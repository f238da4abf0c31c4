use serde::{Deserialize, Serialize};

use crate::types::ResourceLimits;

/// Placeholder replaced by the in-sandbox entry point path
pub const ENTRY_PLACEHOLDER: &str = "{entry}";

/// Directory the project is mounted at inside the sandbox
pub const PROJECT_MOUNT_TARGET: &str = "/app";

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "Python 3.11")
    pub name: String,

    /// Container image providing the interpreter
    pub image: String,

    /// Alternative ids accepted in requests (e.g., "js" for javascript)
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Command that reads the program from standard input
    pub inline_command: Vec<String>,

    /// Command that runs a project entry point
    /// Placeholders: {entry}
    #[serde(default)]
    pub archive_command: Vec<String>,

    /// File name recognized as the project entry point (e.g., "main.py")
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Resource limits for this language (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl Language {
    /// Check whether `id` is one of this language's aliases
    pub fn has_alias(&self, id: &str) -> bool {
        self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(id))
    }

    /// Check whether projects can be run with this language
    pub fn supports_archive(&self) -> bool {
        self.entry_point.is_some() && !self.archive_command.is_empty()
    }

    /// Sandbox path of the entry point file
    pub fn entry_path(entry: &str) -> String {
        format!("{PROJECT_MOUNT_TARGET}/{entry}")
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], entry: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| arg.replace(ENTRY_PLACEHOLDER, entry))
            .collect()
    }
}
