// src/exec/process.rs

//! Low-level child process plumbing: spawning with the workspace as current
//! directory, draining output, and signalling.
//!
//! On Unix every child becomes the leader of its own process group, so
//! signals reach whatever the generated artifact spawns itself (an
//! interpreter's worker processes, a shell's `sleep`, ...).

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::types::Role;

/// Everything needed to start one executable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Path of the written artifact.
    pub executable: PathBuf,
    /// Current directory for the child; the workspace root.
    pub working_dir: PathBuf,
    /// Interpreter plus leading arguments; empty runs `executable` directly.
    pub launcher: Vec<String>,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
            launcher: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Vec<String>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self.launcher.clone();
        parts.push(self.executable.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = match self.launcher.split_first() {
            Some((program, rest)) => {
                let mut c = Command::new(program);
                c.args(rest).arg(&self.executable);
                c
            }
            None => Command::new(&self.executable),
        };
        cmd.args(&self.args).current_dir(&self.working_dir);
        cmd
    }
}

/// Spawn the child and start draining its stdout/stderr into the log.
///
/// The child is killed if its handle is dropped without being reaped.
pub(crate) fn spawn_child(role: &Role, launch: &LaunchCommand) -> Result<Child> {
    let mut cmd = launch.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{}` for role '{}'", launch.display(), role))?;

    if let Some(stdout) = child.stdout.take() {
        drain_lines(role.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        drain_lines(role.clone(), "stderr", stderr);
    }

    Ok(child)
}

/// Consume a pipe so OS buffers never fill; log each line at debug.
fn drain_lines<R>(role: Role, stream: &'static str, pipe: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(role = %role, stream, "{}", line);
        }
        debug!(role = %role, stream, "output closed");
    });
}

/// How stop signals reach a supervised process.
///
/// Production code uses [`OsSignaller`]; tests can provide their own
/// implementation, for example one that drops every signal to exercise the
/// "process would not die" path.
pub trait Signaller: Send + Sync + std::fmt::Debug {
    /// Graceful stop for the process group led by `pid`.
    fn terminate_group(&self, pid: u32) -> io::Result<()>;

    /// Forceful kill of every process in the group led by `pid`. The group
    /// may outlive its leader.
    fn kill_group(&self, pid: u32) -> io::Result<()>;

    /// Forceful kill of the child itself.
    fn kill_child(&self, child: &mut Child) -> io::Result<()>;
}

/// Delivers real signals (`killpg` on Unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignaller;

impl Signaller for OsSignaller {
    fn terminate_group(&self, pid: u32) -> io::Result<()> {
        signal_terminate(pid)
    }

    fn kill_group(&self, pid: u32) -> io::Result<()> {
        signal_kill_group(pid)
    }

    fn kill_child(&self, child: &mut Child) -> io::Result<()> {
        child.start_kill()
    }
}

/// Ask the process group led by `pid` to shut down.
#[cfg(unix)]
fn signal_terminate(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGTERM)
}

/// Graceful signals do not exist here; the caller escalates to a kill.
#[cfg(not(unix))]
fn signal_terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination is not supported on this platform",
    ))
}

/// Forcefully kill every process in the group led by `pid`.
#[cfg(unix)]
fn signal_kill_group(pid: u32) -> io::Result<()> {
    signal_group(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
fn signal_kill_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: killpg has no memory-safety preconditions; an invalid group
    // only yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_is_prepended_and_args_appended() {
        let cmd = LaunchCommand::new("/ws/main.py", "/ws")
            .with_launcher(vec!["python3".into(), "-u".into()])
            .with_args(vec!["--port".into(), "8000".into()]);
        assert_eq!(cmd.display(), "python3 -u /ws/main.py --port 8000");

        let direct = LaunchCommand::new("/ws/run.sh", "/ws");
        assert_eq!(direct.display(), "/ws/run.sh");
    }
}
