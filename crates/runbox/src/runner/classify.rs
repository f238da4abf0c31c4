//! Outcome classification

use crate::types::ExecutionStatus;

/// Map a finished run onto an [`ExecutionStatus`]
///
/// Checked in order:
/// 1. deadline elapsed: [`ExecutionStatus::Timeout`]
/// 2. non-zero or missing exit code with no output at all:
///    [`ExecutionStatus::Killed`]. The runtime killed the program for a
///    resource limit without giving it a chance to write anything. This is
///    a heuristic; a program that fails silently lands here too.
/// 3. non-zero exit: [`ExecutionStatus::RuntimeError`]
/// 4. otherwise [`ExecutionStatus::Success`]
///
/// [`ExecutionStatus::SystemError`] is never produced here.
pub fn classify(
    timed_out: bool,
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> ExecutionStatus {
    if timed_out {
        return ExecutionStatus::Timeout;
    }

    let failed = exit_code != Some(0);
    if failed && stdout.is_empty() && stderr.is_empty() {
        ExecutionStatus::Killed
    } else if failed {
        ExecutionStatus::RuntimeError
    } else {
        ExecutionStatus::Success
    }
}

/// User-facing explanation for outcomes that need one
pub fn status_message(status: ExecutionStatus, deadline_secs: f64) -> Option<String> {
    match status {
        ExecutionStatus::Timeout => Some(format!(
            "Execution timed out after {} seconds.",
            format_seconds(deadline_secs)
        )),
        ExecutionStatus::Killed => {
            Some("Execution stopped: CPU or memory exceeded or killed.".to_string())
        }
        _ => None,
    }
}

fn format_seconds(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{secs:.0}")
    } else {
        format!("{secs}")
    }
}
