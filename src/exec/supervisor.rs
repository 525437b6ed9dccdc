// src/exec/supervisor.rs

//! Per-role process supervision.
//!
//! Each role owns at most one process slot. The state machine per role is
//!
//! ```text
//! NotStarted → Starting → Running → Stopping → Stopped
//!                  └────→ FailedToStart
//! ```
//!
//! Liveness after launch is judged by a fixed grace period followed by a
//! non-blocking poll. This only says the process did not die immediately;
//! it does not mean the artifact is serving anything.
//!
//! The slot is recorded as soon as the child is spawned, so a launch that is
//! abandoned mid-grace still leaves something for teardown to stop. Children
//! lead their own process group; once the leader is gone, teardown kills
//! whatever group members it left behind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::process::Child;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::engine::report::{Reporter, notify};
use crate::errors::{Result, RunnerError};
use crate::exec::process::{LaunchCommand, OsSignaller, Signaller, spawn_child};
use crate::types::{Role, RoleState, TerminateOutcome};

/// Result of the grace-period check that ends `launch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Running { pid: Option<u32> },
    /// The process exited during the grace period.
    FailedToStart { exit_code: Option<i32> },
}

/// Read-only view of a role's process slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub state: RoleState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub launched_at: SystemTime,
}

#[derive(Debug)]
struct SupervisedProcess {
    /// `None` when spawning itself failed.
    child: Option<Child>,
    pid: Option<u32>,
    launched_at: SystemTime,
    state: RoleState,
    exit_code: Option<i32>,
    group_swept: bool,
}

impl SupervisedProcess {
    fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            state: self.state,
            pid: self.pid,
            exit_code: self.exit_code,
            launched_at: self.launched_at,
        }
    }
}

/// Owns every supervised child of a run, keyed by role.
pub struct Supervisor {
    grace_period: Duration,
    slots: BTreeMap<Role, SupervisedProcess>,
    reporter: Option<Arc<dyn Reporter>>,
    signaller: Arc<dyn Signaller>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("grace_period", &self.grace_period)
            .field("slots", &self.slots)
            .field("signaller", &self.signaller)
            .finish_non_exhaustive()
    }
}

fn exit_detail(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Kill what is left of the slot's process group. Runs at most once per slot.
fn sweep_group(signaller: &dyn Signaller, role: &str, slot: &mut SupervisedProcess) {
    if slot.group_swept {
        return;
    }
    let Some(pid) = slot.pid else {
        return;
    };
    slot.group_swept = true;
    match signaller.kill_group(pid) {
        Ok(()) => debug!(role, pid, "killed leftover process group members"),
        Err(e) => debug!(role, pid, error = %e, "process group already empty"),
    }
}

impl Supervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            slots: BTreeMap::new(),
            reporter: None,
            signaller: Arc::new(OsSignaller),
        }
    }

    pub fn with_reporter(mut self, reporter: Option<Arc<dyn Reporter>>) -> Self {
        self.set_reporter(reporter);
        self
    }

    pub fn set_reporter(&mut self, reporter: Option<Arc<dyn Reporter>>) {
        self.reporter = reporter;
    }

    pub fn with_signaller(mut self, signaller: Arc<dyn Signaller>) -> Self {
        self.set_signaller(signaller);
        self
    }

    pub fn set_signaller(&mut self, signaller: Arc<dyn Signaller>) {
        self.signaller = signaller;
    }

    /// Start the artifact described by `launch` in `role`'s slot.
    ///
    /// Fails with `RoleBusy` (leaving the existing process untouched) when
    /// the role is already starting or running, and with `LaunchError` when
    /// the process cannot be spawned at all. A process that spawns but exits
    /// within the grace period is reported as `FailedToStart`, not as an
    /// error.
    pub async fn launch(&mut self, role: &str, launch: &LaunchCommand) -> Result<LaunchOutcome> {
        let previous = match self.slots.get(role) {
            Some(slot) if slot.state.is_active() => {
                warn!(role, pid = ?slot.pid, "launch refused: role already has a live process");
                return Err(RunnerError::RoleBusy(role.to_string()));
            }
            Some(slot) => slot.state,
            None => RoleState::NotStarted,
        };

        notify(
            &self.reporter,
            role,
            previous,
            RoleState::Starting,
            Some(launch.display()),
        );
        info!(
            role,
            cmd = %launch.display(),
            cwd = %launch.working_dir.display(),
            "launching artifact"
        );

        let launched_at = SystemTime::now();
        let child = match spawn_child(&role.to_string(), launch) {
            Ok(child) => child,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(role, error = %reason, "artifact could not be spawned");
                self.slots.insert(
                    role.to_string(),
                    SupervisedProcess {
                        child: None,
                        pid: None,
                        launched_at,
                        state: RoleState::FailedToStart,
                        exit_code: None,
                        group_swept: false,
                    },
                );
                notify(
                    &self.reporter,
                    role,
                    RoleState::Starting,
                    RoleState::FailedToStart,
                    Some(reason.clone()),
                );
                return Err(RunnerError::LaunchError {
                    role: role.to_string(),
                    exit_code: None,
                    reason,
                });
            }
        };
        let pid = child.id();
        self.slots.insert(
            role.to_string(),
            SupervisedProcess {
                child: Some(child),
                pid,
                launched_at,
                state: RoleState::Starting,
                exit_code: None,
                group_swept: false,
            },
        );

        // Fixed wait instead of a readiness check. If this future is dropped
        // here the slot stays `Starting` and teardown stops it.
        sleep(self.grace_period).await;

        let lost = || RunnerError::LaunchError {
            role: role.to_string(),
            exit_code: None,
            reason: "process slot vanished during grace period".to_string(),
        };
        let slot = self.slots.get_mut(role).ok_or_else(lost)?;
        let child = slot.child.as_mut().ok_or_else(lost)?;

        let outcome = match child.try_wait() {
            Ok(None) => LaunchOutcome::Running { pid },
            Ok(Some(status)) => LaunchOutcome::FailedToStart {
                exit_code: status.code(),
            },
            Err(e) => {
                let reason = format!("checking liveness: {e}");
                warn!(role, ?pid, error = %e, "liveness check failed; killing process");
                if let Some(pid) = pid {
                    let _ = self.signaller.kill_group(pid);
                    slot.group_swept = true;
                }
                let _ = self.signaller.kill_child(child);
                slot.state = RoleState::FailedToStart;
                notify(
                    &self.reporter,
                    role,
                    RoleState::Starting,
                    RoleState::FailedToStart,
                    Some(reason.clone()),
                );
                return Err(RunnerError::LaunchError {
                    role: role.to_string(),
                    exit_code: None,
                    reason,
                });
            }
        };

        let detail = match outcome {
            LaunchOutcome::Running { pid } => {
                info!(role, ?pid, grace = ?self.grace_period, "artifact running");
                slot.state = RoleState::Running;
                pid.map(|pid| format!("pid {pid}"))
            }
            LaunchOutcome::FailedToStart { exit_code } => {
                warn!(role, ?pid, ?exit_code, "artifact exited during grace period");
                slot.state = RoleState::FailedToStart;
                slot.exit_code = exit_code;
                Some(exit_detail(exit_code))
            }
        };
        notify(&self.reporter, role, RoleState::Starting, slot.state, detail);

        Ok(outcome)
    }

    /// Re-check liveness now. A process that has exited since the last look
    /// moves to `Stopped` with its exit code. Untracked roles are not running.
    pub fn is_running(&mut self, role: &str) -> bool {
        let Some(slot) = self.slots.get_mut(role) else {
            return false;
        };
        if !slot.state.is_active() {
            return false;
        }
        let Some(child) = slot.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                let from = slot.state;
                slot.exit_code = status.code();
                slot.state = RoleState::Stopped;
                warn!(role, pid = ?slot.pid, exit_code = ?slot.exit_code, "process exited on its own");
                notify(
                    &self.reporter,
                    role,
                    from,
                    RoleState::Stopped,
                    Some(exit_detail(slot.exit_code)),
                );
                false
            }
            Err(e) => {
                warn!(role, pid = ?slot.pid, error = %e, "liveness check failed; assuming still running");
                true
            }
        }
    }

    /// Poll every tracked role; returns how many are still running.
    pub fn refresh(&mut self) -> usize {
        let roles: Vec<Role> = self.slots.keys().cloned().collect();
        roles
            .iter()
            .filter(|role| self.is_running(role))
            .count()
    }

    /// Stop `role`'s process: graceful signal, wait up to `wait`, then kill.
    ///
    /// Never fails. The role always ends in `Stopped` (or stays in
    /// `FailedToStart`); an `Unkillable` outcome tells the caller that the
    /// process may have survived. Group members outliving the leader are
    /// killed on every path that finds the leader gone.
    pub async fn terminate(&mut self, role: &str, wait: Duration) -> TerminateOutcome {
        let signaller = self.signaller.as_ref();
        let Some(slot) = self.slots.get_mut(role) else {
            debug!(role, "terminate: no process tracked");
            return TerminateOutcome::NotTracked;
        };

        if matches!(slot.state, RoleState::Stopped | RoleState::FailedToStart) {
            sweep_group(signaller, role, slot);
            return TerminateOutcome::AlreadyExited(slot.exit_code);
        }

        let from = slot.state;
        let Some(child) = slot.child.as_mut() else {
            slot.state = RoleState::Stopped;
            notify(&self.reporter, role, from, RoleState::Stopped, None);
            return TerminateOutcome::NotTracked;
        };

        if let Ok(Some(status)) = child.try_wait() {
            slot.exit_code = status.code();
            slot.state = RoleState::Stopped;
            notify(
                &self.reporter,
                role,
                from,
                RoleState::Stopped,
                Some(exit_detail(slot.exit_code)),
            );
            sweep_group(signaller, role, slot);
            return TerminateOutcome::AlreadyExited(slot.exit_code);
        }

        slot.state = RoleState::Stopping;
        notify(&self.reporter, role, from, RoleState::Stopping, None);

        let pid = slot.pid;
        info!(role, ?pid, ?wait, "stopping process");

        let signalled = match pid {
            Some(pid) => match signaller.terminate_group(pid) {
                Ok(()) => true,
                Err(e) => {
                    debug!(role, pid, error = %e, "graceful signal not delivered");
                    false
                }
            },
            None => false,
        };

        if signalled {
            let waited = match slot.child.as_mut() {
                Some(child) => timeout(wait, child.wait()).await,
                None => Ok(Err(std::io::Error::other("child handle missing"))),
            };
            match waited {
                Ok(Ok(status)) => {
                    slot.exit_code = status.code();
                    slot.state = RoleState::Stopped;
                    info!(role, ?pid, exit_code = ?slot.exit_code, "process stopped gracefully");
                    notify(
                        &self.reporter,
                        role,
                        RoleState::Stopping,
                        RoleState::Stopped,
                        Some(exit_detail(slot.exit_code)),
                    );
                    sweep_group(signaller, role, slot);
                    return TerminateOutcome::Graceful(slot.exit_code);
                }
                Ok(Err(e)) => {
                    warn!(role, ?pid, error = %e, "waiting for graceful exit failed; escalating");
                }
                Err(_) => {
                    warn!(role, ?pid, ?wait, "process ignored graceful stop; killing");
                }
            }
        }

        if let Some(pid) = pid {
            if let Err(e) = signaller.kill_group(pid) {
                debug!(role, pid, error = %e, "group kill not delivered");
            }
            slot.group_swept = true;
        }

        let outcome = match slot.child.as_mut() {
            Some(child) => {
                if let Err(e) = signaller.kill_child(child) {
                    debug!(role, ?pid, error = %e, "direct kill not delivered");
                }
                match timeout(wait, child.wait()).await {
                    Ok(Ok(status)) => {
                        slot.exit_code = status.code();
                        TerminateOutcome::Killed
                    }
                    Ok(Err(e)) => TerminateOutcome::Unkillable(format!("waiting after kill: {e}")),
                    Err(_) => {
                        TerminateOutcome::Unkillable(format!("still alive {wait:?} after kill"))
                    }
                }
            }
            None => TerminateOutcome::Unkillable("child handle missing".to_string()),
        };

        slot.state = RoleState::Stopped;
        match &outcome {
            TerminateOutcome::Unkillable(reason) => {
                warn!(role, ?pid, reason = %reason, "process could not be stopped")
            }
            _ => info!(role, ?pid, "process killed"),
        }
        let detail = match &outcome {
            TerminateOutcome::Unkillable(reason) => reason.clone(),
            _ => "killed".to_string(),
        };
        notify(
            &self.reporter,
            role,
            RoleState::Stopping,
            RoleState::Stopped,
            Some(detail),
        );

        outcome
    }

    /// Fire-and-forget kill of everything still alive, leftover group
    /// members included. For drop paths where nothing can be awaited.
    pub fn kill_all_now(&mut self) {
        let signaller = self.signaller.as_ref();
        for (role, slot) in self.slots.iter_mut() {
            sweep_group(signaller, role, slot);
            if !slot.state.is_active() && slot.state != RoleState::Stopping {
                continue;
            }
            let Some(child) = slot.child.as_mut() else {
                continue;
            };
            let _ = signaller.kill_child(child);
            slot.state = RoleState::Stopped;
            warn!(role = %role, pid = ?slot.pid, "killed process without graceful stop");
        }
    }

    /// Roles that have (or had) a process slot, in name order.
    pub fn roles(&self) -> Vec<Role> {
        self.slots.keys().cloned().collect()
    }

    pub fn snapshot(&self, role: &str) -> Option<ProcessSnapshot> {
        self.slots.get(role).map(SupervisedProcess::snapshot)
    }

    pub fn is_active(&self, role: &str) -> bool {
        self.slots
            .get(role)
            .is_some_and(|slot| slot.state.is_active())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(dir: &std::path::Path, name: &str, body: &str) -> LaunchCommand {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        LaunchCommand::new(path, dir).with_launcher(vec!["sh".into()])
    }

    #[tokio::test]
    async fn untracked_role_is_not_running_and_terminate_is_noop() {
        let mut sup = Supervisor::new(Duration::from_millis(50));
        assert!(!sup.is_running("backend"));
        assert_eq!(
            sup.terminate("backend", Duration::from_millis(100)).await,
            TerminateOutcome::NotTracked
        );
        assert!(sup.snapshot("backend").is_none());
    }

    #[tokio::test]
    async fn terminate_twice_reports_already_exited() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = Supervisor::new(Duration::from_millis(100));
        let cmd = sh(dir.path(), "svc.sh", "exec sleep 30\n");

        let outcome = sup.launch("backend", &cmd).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Running { .. }));

        let first = sup.terminate("backend", Duration::from_secs(2)).await;
        assert!(matches!(first, TerminateOutcome::Graceful(_)), "got {first:?}");

        let second = sup.terminate("backend", Duration::from_secs(2)).await;
        assert!(matches!(second, TerminateOutcome::AlreadyExited(_)));
        assert_eq!(sup.snapshot("backend").unwrap().state, RoleState::Stopped);
    }

    fn pid_from(path: &std::path::Path) -> u32 {
        std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    fn alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    async fn wait_until_dead(pid: u32) {
        for _ in 0..100 {
            if !alive(pid) {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("process {pid} still alive");
    }

    #[tokio::test]
    async fn terminate_after_failed_start_kills_leftover_background_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = Supervisor::new(Duration::from_millis(300));
        let cmd = sh(
            dir.path(),
            "svc.sh",
            "sleep 30 &\necho $! > worker.pid\nexit 1\n",
        );

        let outcome = sup.launch("backend", &cmd).await.unwrap();
        assert_eq!(outcome, LaunchOutcome::FailedToStart { exit_code: Some(1) });
        let worker = pid_from(&dir.path().join("worker.pid"));
        assert!(alive(worker));

        let stopped = sup.terminate("backend", Duration::from_secs(1)).await;
        assert_eq!(stopped, TerminateOutcome::AlreadyExited(Some(1)));
        wait_until_dead(worker).await;
    }

    #[tokio::test]
    async fn slot_is_tracked_while_grace_period_is_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = Supervisor::new(Duration::from_secs(2));
        let cmd = sh(dir.path(), "svc.sh", "exec sleep 30\n");

        let cancelled = timeout(Duration::from_millis(100), sup.launch("backend", &cmd)).await;
        assert!(cancelled.is_err());

        let snap = sup.snapshot("backend").unwrap();
        assert_eq!(snap.state, RoleState::Starting);
        let pid = snap.pid.unwrap();
        assert!(sup.is_active("backend"));

        let stopped = sup.terminate("backend", Duration::from_secs(1)).await;
        assert!(matches!(stopped, TerminateOutcome::Graceful(_)), "got {stopped:?}");
        wait_until_dead(pid).await;
    }
}
