// src/exec/preflight.rs

//! Environment checks that must pass before a workspace is allocated
//! (e.g. "is the interpreter the artifacts need installed?").

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::PreflightCheck;
use crate::errors::{Result, RunnerError};

/// Outcome of one successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub cmd: String,
    /// First non-empty output line (stdout preferred), for display.
    pub summary: Option<String>,
}

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Run every check in order, stopping at the first failure.
///
/// Each check is bounded by `limit`; a check that exceeds it is killed and
/// counts as failed.
pub async fn run_preflight(checks: &[PreflightCheck], limit: Duration) -> Result<Vec<PreflightReport>> {
    let mut reports = Vec::with_capacity(checks.len());

    for check in checks {
        let mut cmd = shell(&check.cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RunnerError::PreflightError(format!(
                    "`{}` could not be run: {e}",
                    check.cmd
                )));
            }
            Err(_) => {
                return Err(RunnerError::PreflightError(format!(
                    "`{}` did not finish within {limit:?}",
                    check.cmd
                )));
            }
        };

        if !output.status.success() {
            let reason = first_line(&output.stderr).unwrap_or_else(|| "no output".to_string());
            warn!(cmd = %check.cmd, exit_code = ?output.status.code(), "preflight check failed");
            return Err(RunnerError::PreflightError(format!(
                "`{}` exited with {:?}: {reason}",
                check.cmd,
                output.status.code()
            )));
        }

        let summary = first_line(&output.stdout).or_else(|| first_line(&output.stderr));
        info!(cmd = %check.cmd, summary = ?summary, "preflight check passed");
        reports.push(PreflightReport {
            cmd: check.cmd.clone(),
            summary,
        });
    }

    Ok(reports)
}
