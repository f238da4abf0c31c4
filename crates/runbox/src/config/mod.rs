use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub use crate::config::language::{ENTRY_PLACEHOLDER, Language, PROJECT_MOUNT_TARGET};
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Runbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the docker CLI (uses PATH if not specified).
    #[serde(default)]
    pub docker_path: Option<PathBuf>,

    /// Number of sandboxes allowed to run at once.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Seconds a request may wait for a free slot before it is rejected.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: f64,

    /// Seconds allowed for the forced removal of a timed-out sandbox.
    ///
    /// A floor: a removal always gets a little longer than the execution
    /// deadline it follows.
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout: f64,

    /// Maximum inline source length in characters.
    #[serde(default = "default_max_source_length")]
    pub max_source_length: usize,

    /// Captured stdout/stderr are cut to this many bytes each.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Prefix of the unique sandbox instance names.
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,

    /// User the sandboxed program runs as (image default when unset).
    #[serde(default)]
    pub user: Option<String>,

    /// Append-only execution log location.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Language used when a request names an unknown language.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Languages probed, in order, for a project entry point.
    #[serde(default)]
    pub archive_entry_order: Vec<String>,

    /// Default resource limits applied to all executions.
    /// Per-language limits and request limits override these.
    /// Fields missing from the table keep their built-in defaults.
    #[serde(default, deserialize_with = "limits_over_defaults")]
    pub default_limits: ResourceLimits,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_path: None,
            max_parallel: default_max_parallel(),
            acquire_timeout: default_acquire_timeout(),
            cleanup_timeout: default_cleanup_timeout(),
            max_source_length: default_max_source_length(),
            max_output_bytes: default_max_output_bytes(),
            instance_prefix: default_instance_prefix(),
            user: None,
            log_path: default_log_path(),
            default_language: default_language(),
            archive_entry_order: Vec::new(),
            default_limits: ResourceLimits::default(),
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID or alias
    pub fn get_language(&self, id: &str) -> Result<(&str, &Language), ConfigError> {
        if let Some((key, lang)) = self.languages.get_key_value(id) {
            return Ok((key.as_str(), lang));
        }
        self.languages
            .iter()
            .find(|(_, lang)| lang.has_alias(id))
            .map(|(key, lang)| (key.as_str(), lang))
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Get a language by ID or alias, falling back to the default language
    pub fn language_or_default(&self, id: &str) -> Result<(&str, &Language), ConfigError> {
        match self.get_language(id) {
            Ok(found) => Ok(found),
            Err(ConfigError::LanguageNotFound(_)) => {
                tracing::debug!(
                    requested = id,
                    fallback = %self.default_language,
                    "unknown language, using default"
                );
                self.get_language(&self.default_language)
            }
            Err(e) => Err(e),
        }
    }

    /// Get the path to the docker CLI
    pub fn docker_binary(&self) -> PathBuf {
        self.docker_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }

    /// How long a request may wait for admission
    pub fn acquire_wait(&self) -> Duration {
        seconds(self.acquire_timeout)
    }

    /// How long the forced removal of a sandbox may take
    pub fn cleanup_wait(&self) -> Duration {
        seconds(self.cleanup_timeout)
    }

    /// Merge limits: config defaults, then language limits, then request overrides
    pub fn effective_limits(
        &self,
        language: &Language,
        overrides: Option<&ResourceLimits>,
    ) -> ResourceLimits {
        let mut limits = self.default_limits.clone();
        if let Some(ref lang_limits) = language.limits {
            limits = limits.with_overrides(lang_limits);
        }
        if let Some(user_limits) = overrides {
            limits = limits.with_overrides(user_limits);
        }
        limits
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn limits_over_defaults<'de, D>(deserializer: D) -> Result<ResourceLimits, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = ResourceLimits::deserialize(deserializer)?;
    Ok(ResourceLimits::default().with_overrides(&parsed))
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_max_parallel() -> usize {
    5
}

fn default_acquire_timeout() -> f64 {
    30.0
}

fn default_cleanup_timeout() -> f64 {
    12.0
}

fn default_max_source_length() -> usize {
    5000
}

fn default_max_output_bytes() -> usize {
    200_000
}

fn default_instance_prefix() -> String {
    "runbox".to_owned()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs/executions.log")
}

fn default_language() -> String {
    "python".to_owned()
}
