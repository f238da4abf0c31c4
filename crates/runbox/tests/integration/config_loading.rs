use std::path::PathBuf;
use std::time::Duration;

use runbox::config::{Config, ConfigError};
use runbox::sandbox::{DockerCommand, SandboxSource, SandboxSpecBuilder};

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_valid_config() {
    let config = load("valid_full.toml").expect("Failed to load config");

    assert_eq!(config.max_parallel, 2);
    assert_eq!(config.acquire_wait(), Duration::from_secs(5));
    assert_eq!(config.cleanup_wait(), Duration::from_secs(4));
    assert_eq!(config.max_source_length, 1000);
    assert_eq!(config.max_output_bytes, 4096);
    assert_eq!(config.instance_prefix, "judge");
    assert_eq!(config.user.as_deref(), Some("65534:65534"));
    assert_eq!(
        config.log_path,
        PathBuf::from("/var/log/runbox/executions.log")
    );
    assert_eq!(config.archive_entry_order, vec!["javascript", "python"]);
    assert_eq!(config.default_limits.wall_time_limit, Some(3.0));
    assert_eq!(config.default_limits.scratch_size, Some(8192));

    let (_, python) = config.get_language("py").unwrap();
    assert_eq!(python.image, "python:3.12-alpine");
    let limits = config.effective_limits(python, None);
    assert_eq!(limits.memory_limit, Some(262144));
    assert_eq!(limits.max_processes, Some(16));
}

#[test]
fn test_load_minimal_config() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert!(config.languages.contains_key("shell"));
    assert!(!config.languages["shell"].supports_archive());
    assert_eq!(config.max_parallel, 5);
    assert_eq!(config.max_output_bytes, 200_000);
}

#[test]
fn test_partial_default_limits_keep_every_cap() {
    let config = load("valid_partial_limits.toml").expect("Failed to load config");
    let (_, python) = config.get_language("python").unwrap();
    let limits = config.effective_limits(python, None);
    assert_eq!(limits.wall_time_limit, Some(5.0));

    let spec = SandboxSpecBuilder::new(&config).build(python, SandboxSource::Inline, &limits);
    let args = DockerCommand::from_spec("docker", &spec).build();

    assert!(args.iter().any(|a| a.starts_with("--memory=")), "{args:?}");
    assert!(args.iter().any(|a| a.starts_with("--memory-swap=")), "{args:?}");
    assert!(args.iter().any(|a| a.starts_with("--pids-limit=")), "{args:?}");
    assert!(
        args.iter()
            .any(|a| a.starts_with("--tmpfs=") && a.contains("size=")),
        "{args:?}"
    );
}

#[test]
fn test_load_invalid_zero_memory() {
    match load("invalid_zero_memory.toml") {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("memory_limit")),
        other => panic!("expected Invalid error, got {other:?}"),
    }
}

#[test]
fn test_load_missing_file() {
    match load("does_not_exist.toml") {
        Err(ConfigError::ReadFile { path, .. }) => {
            assert!(path.ends_with("does_not_exist.toml"))
        }
        other => panic!("expected ReadFile error, got {other:?}"),
    }
}

#[test]
fn test_load_invalid_empty_image() {
    assert!(load("invalid_empty_image.toml").is_err());
}

#[test]
fn test_load_invalid_empty_inline_command() {
    assert!(load("invalid_empty_inline_command.toml").is_err());
}

#[test]
fn test_load_invalid_entry_order() {
    assert!(matches!(
        load("invalid_entry_order.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_archive_command() {
    assert!(matches!(
        load("invalid_archive_command.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_load_invalid_default_language() {
    match load("invalid_default_language.toml") {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("ruby")),
        other => panic!("expected Invalid error, got {other:?}"),
    }
}

#[test]
fn test_load_invalid_max_parallel() {
    assert!(matches!(
        load("invalid_max_parallel.toml"),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_example_config_round_trips_through_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("runbox.toml");
    std::fs::write(&path, runbox::EXAMPLE_CONFIG).unwrap();

    let config = Config::from_file(&path).expect("example config should load");
    assert_eq!(config.default_language, "python");
    assert!(config.get_language("node").is_ok());
}
