use std::sync::Arc;
use std::time::{Duration, Instant};

use runbox::config::Config;
use runbox::log::{FileExecutionLog, MemoryExecutionLog};
use runbox::runner::{ExecuteError, Executor, ProjectDir, TRUNCATION_MARKER, resolve_entry_point};
use runbox::sandbox::SandboxError;
use runbox::types::{ExecutionStatus, ResourceLimits};

use super::{HostRuntime, fixture_path, shell_config};

fn executor(config: Config) -> (Executor, Arc<HostRuntime>, Arc<MemoryExecutionLog>) {
    executor_with(config, HostRuntime::default())
}

fn executor_with(
    config: Config,
    runtime: HostRuntime,
) -> (Executor, Arc<HostRuntime>, Arc<MemoryExecutionLog>) {
    let runtime = Arc::new(runtime);
    let log = Arc::new(MemoryExecutionLog::new());
    let executor = Executor::with_runtime(config, runtime.clone(), log.clone());
    (executor, runtime, log)
}

fn project_with(files: &[(&str, &str)]) -> std::path::PathBuf {
    let dir = tempfile::TempDir::new().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    dir.keep()
}

#[tokio::test]
async fn test_inline_success() {
    let (executor, runtime, log) = executor(shell_config());

    let result = executor
        .execute_inline("echo hi", "shell", None)
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.is_success());
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
    assert!(result.message.is_none());
    assert_eq!(result.language, "shell");
    assert!(result.instance_id.starts_with("runbox-inline-"));
    assert!(runtime.terminations().is_empty());

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ExecutionStatus::Success);
    assert_eq!(entries[0].source, "echo hi");
    assert_eq!(entries[0].output, "hi\n");
    assert_eq!(executor.gate().available(), executor.gate().capacity());
}

#[tokio::test]
async fn test_unknown_language_runs_as_default() {
    let (executor, _, _) = executor(shell_config());

    let result = executor
        .execute_inline("echo fallback", "cobol", None)
        .await
        .unwrap();
    assert_eq!(result.language, "shell");
    assert_eq!(result.stdout, "fallback\n");
}

#[tokio::test]
async fn test_timeout_terminates_exactly_once() {
    let (executor, runtime, log) = executor(shell_config());
    let limits = ResourceLimits::unset().with_wall_time_limit(0.5);

    let started = Instant::now();
    let result = executor
        .execute_inline("echo started; while :; do :; done", "shell", Some(&limits))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.stdout, "started\n");
    assert_eq!(
        result.message.as_deref(),
        Some("Execution timed out after 0.5 seconds.")
    );
    assert_eq!(runtime.terminations(), vec![result.instance_id.clone()]);
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");

    let entries = log.entries();
    assert_eq!(entries[0].status, ExecutionStatus::Timeout);
    assert!(entries[0].render().contains("RETURN CODE: -1\n"));
    assert_eq!(executor.gate().in_use(), 0);
}

#[tokio::test]
async fn test_silent_kill_is_classified_killed() {
    let (executor, _, _) = executor(shell_config());

    let result = executor
        .execute_inline("kill -9 $$", "shell", None)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Killed);
    assert_eq!(result.exit_code, Some(137));
    assert_eq!(
        result.message.as_deref(),
        Some("Execution stopped: CPU or memory exceeded or killed.")
    );
}

#[tokio::test]
async fn test_runtime_error_keeps_diagnostics() {
    let (executor, _, log) = executor(shell_config());

    let result = executor
        .execute_inline("echo boom >&2; exit 1", "shell", None)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.stderr, "boom\n");
    assert!(result.message.is_none());
    assert!(
        log.entries()[0]
            .render()
            .contains("STATUS: RUNTIME ERROR\nRETURN CODE: 1\n")
    );
}

#[tokio::test]
async fn test_oversized_source_rejected_while_gate_saturated() {
    let config = Config {
        max_parallel: 1,
        max_source_length: 16,
        ..shell_config()
    };
    let (executor, _, log) = executor(config);
    let _held = executor.gate().acquire(Duration::ZERO).await.unwrap();

    let started = Instant::now();
    let result = executor
        .execute_inline(&"echo x; ".repeat(10), "shell", None)
        .await;

    assert!(matches!(result, Err(ExecuteError::Validation(_))));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_busy_when_no_slot_frees_up() {
    let config = Config {
        max_parallel: 1,
        acquire_timeout: 0.1,
        ..shell_config()
    };
    let (executor, _, log) = executor(config);
    let held = executor.gate().acquire(Duration::ZERO).await.unwrap();

    let result = executor.execute_inline("echo hi", "shell", None).await;
    assert!(matches!(result, Err(ExecuteError::Busy(_))));
    assert!(log.entries().is_empty());

    held.release();
    assert!(executor.execute_inline("echo hi", "shell", None).await.is_ok());
}

#[tokio::test]
async fn test_missing_runtime_is_system_error() {
    let runtime = HostRuntime {
        launch_override: Some(vec!["/nonexistent/docker".to_string()]),
        ..Default::default()
    };
    let (executor, _, log) = executor_with(shell_config(), runtime);

    let result = executor.execute_inline("echo hi", "shell", None).await;
    match result {
        Err(ExecuteError::System(SandboxError::RuntimeNotFound(path))) => {
            assert_eq!(path.to_str(), Some("/nonexistent/docker"))
        }
        other => panic!("expected RuntimeNotFound, got {other:?}"),
    }

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ExecutionStatus::SystemError);
    assert!(entries[0].render().contains("RETURN CODE: -1\n"));
    assert_eq!(executor.gate().in_use(), 0);
}

#[tokio::test]
async fn test_output_is_truncated() {
    let config = Config {
        max_output_bytes: 16,
        ..shell_config()
    };
    let (executor, _, _) = executor(config);

    let result = executor
        .execute_inline("head -c 100000 /dev/zero | tr '\\0' a", "shell", None)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, format!("{}{TRUNCATION_MARKER}", "a".repeat(16)));
}

#[tokio::test]
async fn test_archive_runs_entry_point_and_removes_directory() {
    let (executor, _, log) = executor(shell_config());
    let path = project_with(&[("main.sh", "echo from project"), ("notes.txt", "")]);

    let result = executor
        .execute_archive(ProjectDir::transient(&path), None)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "from project\n");
    assert_eq!(result.language, "shell");
    assert!(result.instance_id.starts_with("runbox-archive-"));
    assert!(!path.exists());

    let entries = log.entries();
    assert!(entries[0].source.starts_with("ARCHIVE "));
    assert!(entries[0].source.ends_with("(main.sh)"));
}

#[tokio::test]
async fn test_archive_without_entry_point() {
    let (executor, _, log) = executor(shell_config());
    let path = project_with(&[("README.md", "nothing to run")]);

    let result = executor
        .execute_archive(ProjectDir::transient(&path), None)
        .await;

    match result {
        Err(ExecuteError::Validation(msg)) => assert!(msg.contains("no recognized entry point")),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert!(!path.exists());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_zero_caps_rejected_for_archives() {
    let (executor, runtime, log) = executor(shell_config());

    for limits in [
        ResourceLimits::unset().with_memory_limit(0),
        ResourceLimits::unset().with_max_processes(0),
        ResourceLimits::unset().with_scratch_size(0),
    ] {
        let path = project_with(&[("main.sh", "echo unreachable")]);
        let result = executor
            .execute_archive(ProjectDir::transient(&path), Some(&limits))
            .await;

        assert!(
            matches!(result, Err(ExecuteError::Validation(_))),
            "{limits:?} gave {result:?}"
        );
        assert!(!path.exists());
    }
    assert!(log.entries().is_empty());
    assert!(runtime.terminations().is_empty());
    assert_eq!(executor.gate().in_use(), 0);
}

#[tokio::test]
async fn test_zero_memory_rejected_inline() {
    let (executor, _, log) = executor(shell_config());
    let limits = ResourceLimits::unset().with_memory_limit(0);

    let result = executor
        .execute_inline("echo hi", "shell", Some(&limits))
        .await;

    match result {
        Err(ExecuteError::Validation(msg)) => assert!(msg.contains("memory_limit")),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_borrowed_project_is_kept() {
    let (executor, _, _) = executor(shell_config());
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.sh"), "exit 3").unwrap();

    let result = executor
        .execute_archive(ProjectDir::borrowed(dir.path()), None)
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Killed);
    assert_eq!(result.exit_code, Some(3));
    assert!(dir.path().join("main.sh").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_the_gate() {
    let config = Config {
        max_parallel: 2,
        ..shell_config()
    };
    let (executor, _, log) = executor(config);

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_inline(&format!("sleep 0.1; echo {i}"), "shell", None)
                    .await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.stdout, format!("{i}\n"));
    }
    assert_eq!(log.entries().len(), 6);
    assert_eq!(executor.gate().available(), 2);
}

#[tokio::test]
async fn test_file_log_records_execution() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = Arc::new(FileExecutionLog::new(dir.path().join("logs/executions.log")));
    let executor = Executor::with_runtime(
        shell_config(),
        Arc::new(HostRuntime::default()),
        log.clone(),
    );

    executor.execute_inline("echo hi", "shell", None).await.unwrap();

    let history = log.read_history().unwrap();
    assert!(history.starts_with("----------------------------\nTIME: "));
    assert!(history.contains("STATUS: SUCCESS\nRETURN CODE: 0\n"));
    assert!(history.contains("USER CODE:\necho hi\n"));
    assert!(history.contains("OUTPUT:\nhi\n"));
}

#[tokio::test]
async fn test_probe_runtime() {
    let (executor, _, _) = executor(shell_config());
    assert_eq!(executor.probe_runtime().await.unwrap(), "host");
}

#[test]
fn test_fixture_project_prefers_python() {
    let entry = resolve_entry_point(&fixture_path("projects/both"), &Config::default()).unwrap();
    assert_eq!(entry.language_id, "python");
    assert_eq!(entry.file_name, "main.py");

    let entry = resolve_entry_point(&fixture_path("projects/node"), &Config::default()).unwrap();
    assert_eq!(entry.language_id, "javascript");
}
