//! Runbox CLI
//!
//! A command-line tool for running untrusted code in hardened containers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runbox::{
    Config, EXAMPLE_CONFIG, ExecuteError, ExecutionResult, ExecutionStatus, Executor,
    FileExecutionLog, ProjectDir, ResourceLimits,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "A tool for running untrusted code in hardened containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runbox.toml)
        #[arg(short, long, default_value = "runbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a single source file
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID or alias (e.g., python, js)
        #[arg(short, long)]
        language: String,

        /// Wall time limit in seconds
        #[arg(short, long)]
        wall_time: Option<f64>,

        /// Memory limit in KB
        #[arg(short, long = "memory", value_parser = clap::value_parser!(u64).range(1..))]
        memory_limit: Option<u64>,
    },

    /// Run an extracted project directory from its entry point
    RunProject {
        /// Project directory (left in place)
        #[arg(value_name = "DIR")]
        project: PathBuf,

        /// Wall time limit in seconds
        #[arg(short, long)]
        wall_time: Option<f64>,

        /// Memory limit in KB
        #[arg(short, long = "memory", value_parser = clap::value_parser!(u64).range(1..))]
        memory_limit: Option<u64>,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,

    /// Print the execution log
    History,

    /// Check that the container runtime is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Program output goes to stdout, diagnostics to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            wall_time,
            memory_limit,
        } => {
            let limits = user_limits(wall_time, memory_limit);
            run_inline(config, &source, &language, limits.as_ref()).await
        }
        Commands::RunProject {
            project,
            wall_time,
            memory_limit,
        } => {
            let limits = user_limits(wall_time, memory_limit);
            run_project(config, &project, limits.as_ref()).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::History => show_history(&config),
        Commands::Check => check_runtime(config).await,
    }
}

/// Only explicitly given limits, so they don't override per-language defaults
fn user_limits(wall_time: Option<f64>, memory_limit: Option<u64>) -> Option<ResourceLimits> {
    if wall_time.is_none() && memory_limit.is_none() {
        return None;
    }
    Some(ResourceLimits {
        wall_time_limit: wall_time,
        memory_limit,
        ..ResourceLimits::unset()
    })
}

async fn run_inline(
    config: Config,
    source: &Path,
    language: &str,
    limits: Option<&ResourceLimits>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let executor = Executor::new(config);
    info!(language, "running program");
    let result = executor.execute_inline(&code, language, limits).await;
    report(result)
}

async fn run_project(
    config: Config,
    project: &Path,
    limits: Option<&ResourceLimits>,
) -> Result<()> {
    let executor = Executor::new(config);
    info!(project = %project.display(), "running project");
    let result = executor
        .execute_archive(ProjectDir::borrowed(project), limits)
        .await;
    report(result)
}

fn report(result: Result<ExecutionResult, ExecuteError>) -> Result<()> {
    let result = match result {
        Ok(result) => result,
        Err(e @ ExecuteError::System(_)) => {
            return Err(e).context("sandbox runtime unavailable");
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    if let Some(ref message) = result.message {
        eprintln!("{message}");
    }

    // Execution info goes through tracing (stderr), keeping stdout clean for piping
    info!(
        status = %result.status,
        wall_time = format_args!("{:.3}s", result.wall_time),
        exit_code = ?result.exit_code,
        instance = %result.instance_id,
        "execution result"
    );

    match result.status {
        ExecutionStatus::Success => Ok(()),
        ExecutionStatus::Timeout => std::process::exit(124),
        _ => std::process::exit(result.exit_code.filter(|&code| code != 0).unwrap_or(1)),
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let entry = lang.entry_point.as_deref().unwrap_or("-");
        let aliases = if lang.aliases.is_empty() {
            String::new()
        } else {
            format!(" [{}]", lang.aliases.join(", "))
        };
        println!("  {:<12} {} ({}, entry: {}){}", id, lang.name, lang.image, entry, aliases);
    }
}

fn show_config(config: &Config) {
    println!("Default resource limits:");
    println!(
        "  Wall time limit: {:?} s",
        config.default_limits.wall_time_limit
    );
    println!(
        "  Memory limit: {:?} KB",
        config.default_limits.memory_limit
    );
    println!("  Max processes: {:?}", config.default_limits.max_processes);
    println!("  Scratch size: {:?} KB", config.default_limits.scratch_size);
    println!();
    println!("Max parallel sandboxes: {}", config.max_parallel);
    println!("Admission timeout: {} s", config.acquire_timeout);
    println!("Cleanup timeout: {} s", config.cleanup_timeout);
    println!("Max source length: {} chars", config.max_source_length);
    println!("Max output: {} bytes", config.max_output_bytes);
    println!();
    println!("Docker binary: {}", config.docker_binary().display());
    println!("Execution log: {}", config.log_path.display());
    println!();
    println!(
        "Languages configured: {} (default: {})",
        config.languages.len(),
        config.default_language
    );
}

fn show_history(config: &Config) -> Result<()> {
    let log = FileExecutionLog::new(config.log_path.clone());
    let history = log
        .read_history()
        .context("failed to read execution log")?;
    if history.is_empty() {
        println!("No executions recorded yet.");
    } else {
        print!("{history}");
    }
    Ok(())
}

async fn check_runtime(config: Config) -> Result<()> {
    let docker = config.docker_binary();
    let executor = Executor::new(config);
    let version = executor
        .probe_runtime()
        .await
        .with_context(|| format!("container runtime at '{}' is unavailable", docker.display()))?;
    println!("Docker server version {version}");
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
