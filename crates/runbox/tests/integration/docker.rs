use std::sync::Arc;
use std::time::{Duration, Instant};

use runbox::config::Config;
use runbox::log::MemoryExecutionLog;
use runbox::runner::{Executor, ProjectDir};
use runbox::sandbox::DockerRuntime;
use runbox::types::{ExecutionStatus, ResourceLimits};

use super::{fixture_path, fixture_source};

fn docker_executor() -> Executor {
    let config = Config::default();
    let runtime = Arc::new(DockerRuntime::new(config.docker_binary()));
    Executor::with_runtime(config, runtime, Arc::new(MemoryExecutionLog::new()))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_probe() {
    let version = docker_executor()
        .probe_runtime()
        .await
        .expect("docker should be reachable");
    assert!(!version.is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_python_hello() {
    let result = docker_executor()
        .execute_inline(&fixture_source("hello.py"), "python", None)
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "hi\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_javascript_hello() {
    let result = docker_executor()
        .execute_inline(&fixture_source("hello.js"), "js", None)
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "hi from node\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_runtime_error() {
    let result = docker_executor()
        .execute_inline(&fixture_source("divide_by_zero.py"), "python", None)
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.stderr.contains("ZeroDivisionError"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_infinite_loop_times_out() {
    let limits = ResourceLimits::unset().with_wall_time_limit(2.0);

    let started = Instant::now();
    let result = docker_executor()
        .execute_inline(&fixture_source("infinite_loop.py"), "python", Some(&limits))
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.exit_code, None);
    assert!(started.elapsed() < Duration::from_secs(2 + 12 + 2));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_network_is_disabled() {
    let code = "import socket\nsocket.create_connection(('1.1.1.1', 53), timeout=2)\n";
    let result = docker_executor()
        .execute_inline(code, "python", None)
        .await
        .expect("execution failed");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_project_prefers_python() {
    let result = docker_executor()
        .execute_archive(ProjectDir::borrowed(fixture_path("projects/both")), None)
        .await
        .expect("execution failed");

    assert_eq!(result.language, "python");
    assert_eq!(result.stdout, "from main.py\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_docker_project_node() {
    let result = docker_executor()
        .execute_archive(ProjectDir::borrowed(fixture_path("projects/node")), None)
        .await
        .expect("execution failed");

    assert_eq!(result.language, "javascript");
    assert_eq!(result.stdout, "from index.js\n");
}
