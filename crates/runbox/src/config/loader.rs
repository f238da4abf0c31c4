//! Configuration file loading for Runbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError, ENTRY_PLACEHOLDER};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.instance_prefix.is_empty()
            || !self
                .instance_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "instance_prefix '{}' must be non-empty and alphanumeric",
                self.instance_prefix
            )));
        }

        let defaults = &self.default_limits;
        if defaults.memory_limit.is_none()
            || defaults.max_processes.is_none()
            || defaults.scratch_size.is_none()
        {
            return Err(ConfigError::Invalid(
                "default_limits must set memory_limit, max_processes and scratch_size".to_string(),
            ));
        }
        defaults
            .check_caps()
            .map_err(|e| ConfigError::Invalid(format!("default_limits: {e}")))?;

        for (id, lang) in &self.languages {
            if let Some(ref limits) = lang.limits {
                limits
                    .check_caps()
                    .map_err(|e| ConfigError::Invalid(format!("language '{id}' limits: {e}")))?;
            }
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if lang.inline_command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty inline command"
                )));
            }
            if !lang.archive_command.is_empty()
                && !lang
                    .archive_command
                    .iter()
                    .any(|arg| arg.contains(ENTRY_PLACEHOLDER))
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' archive command does not reference {ENTRY_PLACEHOLDER}"
                )));
            }
            if let Some(ref entry) = lang.entry_point
                && (entry.is_empty() || entry.contains('/') || entry.contains(".."))
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has invalid entry point '{entry}'"
                )));
            }
        }

        if !self.languages.is_empty() && self.get_language(&self.default_language).is_err() {
            return Err(ConfigError::Invalid(format!(
                "default language '{}' is not configured",
                self.default_language
            )));
        }

        for id in &self.archive_entry_order {
            let lang = self.languages.get(id).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "archive_entry_order names unknown language '{id}'"
                ))
            })?;
            if !lang.supports_archive() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' in archive_entry_order has no entry point or archive command"
                )));
            }
        }

        Ok(())
    }
}
