// src/engine/controller.rs

//! The lifecycle of one run: `begin → deploy* → status* → end`.
//!
//! `LifecycleRun` owns the workspace, the artifact writer and the process
//! supervisor. Teardown always stops processes strictly before the
//! workspace is removed, collects failures instead of raising them, and runs
//! at most once. A run dropped without `end()` falls back to a synchronous
//! best-effort cleanup in `Drop`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactWriter};
use crate::config::RunnerSettings;
use crate::engine::report::{Reporter, notify};
use crate::errors::{Result, RunnerError};
use crate::exec::{LaunchCommand, LaunchOutcome, Signaller, Supervisor};
use crate::types::{Role, RoleState, TerminateOutcome};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// `begin()` has not succeeded yet.
    Idle,
    Active,
    Ended,
}

/// What a successful `deploy` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Executable artifact survived the grace period.
    Running { path: PathBuf, pid: Option<u32> },
    /// Executable artifact exited during the grace period.
    FailedToStart { path: PathBuf, exit_code: Option<i32> },
    /// Non-executable artifact written for external use.
    Written { path: PathBuf },
}

impl DeployOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DeployOutcome::Running { path, .. }
            | DeployOutcome::FailedToStart { path, .. }
            | DeployOutcome::Written { path } => path,
        }
    }

    pub fn state(&self) -> RoleState {
        match self {
            DeployOutcome::Running { .. } => RoleState::Running,
            DeployOutcome::FailedToStart { .. } => RoleState::FailedToStart,
            DeployOutcome::Written { .. } => RoleState::Written,
        }
    }

    /// `FailedToStart` as a `LaunchError`, for callers that want the
    /// failure in the error taxonomy.
    pub fn launch_error(&self, role: &str) -> Option<RunnerError> {
        match self {
            DeployOutcome::FailedToStart { exit_code, .. } => Some(RunnerError::LaunchError {
                role: role.to_string(),
                exit_code: *exit_code,
                reason: "process exited during the grace period".to_string(),
            }),
            _ => None,
        }
    }
}

/// Last observed state of a deployed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStatus {
    pub state: RoleState,
    pub path: PathBuf,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

impl RoleStatus {
    /// `file://` URL of the artifact, handy for static pages.
    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Everything `end()` did and everything that went wrong while doing it.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub stopped: Vec<(Role, TerminateOutcome)>,
    /// `TerminationError`s and, if the directory survived, a `ResourceError`.
    pub errors: Vec<RunnerError>,
    /// The workspace that was removed, if there was one.
    pub workspace_removed: Option<PathBuf>,
    /// `end()` had already run; nothing was done.
    pub already_ended: bool,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Deployed {
    path: PathBuf,
    executable: bool,
}

/// Aggregate root of one run.
pub struct LifecycleRun {
    settings: RunnerSettings,
    supervisor: Supervisor,
    writer: ArtifactWriter,
    workspace: Option<Workspace>,
    deployed: BTreeMap<Role, Deployed>,
    reporter: Option<Arc<dyn Reporter>>,
    phase: Phase,
}

impl fmt::Debug for LifecycleRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleRun")
            .field("phase", &self.phase)
            .field("workspace", &self.workspace)
            .field("deployed", &self.deployed)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl LifecycleRun {
    pub fn new(settings: RunnerSettings) -> Self {
        Self {
            supervisor: Supervisor::new(settings.grace_period),
            settings,
            writer: ArtifactWriter::default(),
            workspace: None,
            deployed: BTreeMap::new(),
            reporter: None,
            phase: Phase::Idle,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self.supervisor.set_reporter(self.reporter.clone());
        self
    }

    /// Route stop and kill signals through `signaller` instead of the OS.
    pub fn with_signaller(mut self, signaller: Arc<dyn Signaller>) -> Self {
        self.supervisor.set_signaller(signaller);
        self
    }

    pub fn with_writer(mut self, writer: ArtifactWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Workspace root while the run is active.
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace.as_ref().and_then(Workspace::path)
    }

    /// Allocate the workspace. Nothing else happens until this succeeds.
    pub fn begin(&mut self) -> Result<PathBuf> {
        match self.phase {
            Phase::Active => {
                return Err(RunnerError::ResourceError(
                    "begin() called twice on the same run".to_string(),
                ));
            }
            Phase::Ended => {
                return Err(RunnerError::ResourceError(
                    "run has ended; workspaces are never reused".to_string(),
                ));
            }
            Phase::Idle => {}
        }

        let scratch = self.settings.scratch_root();
        let workspace = Workspace::create(&scratch, &self.settings.workspace_prefix)?;
        let path = workspace.location().to_path_buf();

        self.workspace = Some(workspace);
        self.phase = Phase::Active;
        Ok(path)
    }

    /// Write `artifact` into the workspace and, if it is executable, launch
    /// it in the artifact's role.
    ///
    /// Errors only affect this role: an `IoError` leaves nothing launched, a
    /// `RoleBusy` leaves the running process and its file untouched.
    pub async fn deploy(&mut self, artifact: &Artifact) -> Result<DeployOutcome> {
        let role = artifact.role.as_str();

        if self.phase != Phase::Active {
            return Err(RunnerError::ResourceError(format!(
                "cannot deploy '{role}': no active workspace"
            )));
        }
        let Some(workspace) = self.workspace.as_ref() else {
            return Err(RunnerError::ResourceError(format!(
                "cannot deploy '{role}': no active workspace"
            )));
        };

        // Refuse before writing so a live process never sees its file replaced.
        if self.supervisor.is_active(role) {
            return Err(RunnerError::RoleBusy(role.to_string()));
        }

        let path = match self.writer.write(workspace, artifact) {
            Ok(path) => path,
            Err(e) => {
                warn!(role, error = %e, "artifact write failed");
                return Err(e);
            }
        };
        let root = workspace.location().to_path_buf();

        self.deployed.insert(
            role.to_string(),
            Deployed {
                path: path.clone(),
                executable: artifact.executable,
            },
        );

        if !artifact.executable {
            notify(
                &self.reporter,
                role,
                RoleState::NotStarted,
                RoleState::Written,
                Some(format!("file://{}", path.display())),
            );
            return Ok(DeployOutcome::Written { path });
        }

        let launch = LaunchCommand::new(&path, root)
            .with_launcher(artifact.launcher.clone())
            .with_args(artifact.args.clone());

        match self.supervisor.launch(role, &launch).await? {
            LaunchOutcome::Running { pid } => Ok(DeployOutcome::Running { path, pid }),
            LaunchOutcome::FailedToStart { exit_code } => {
                Ok(DeployOutcome::FailedToStart { path, exit_code })
            }
        }
    }

    /// Per-role state as last observed; processes are not re-checked.
    pub fn status(&self) -> BTreeMap<Role, RoleStatus> {
        self.deployed
            .iter()
            .map(|(role, deployed)| {
                let snapshot = if deployed.executable {
                    self.supervisor.snapshot(role)
                } else {
                    None
                };
                let status = match snapshot {
                    Some(snap) => RoleStatus {
                        state: snap.state,
                        path: deployed.path.clone(),
                        pid: snap.pid,
                        exit_code: snap.exit_code,
                    },
                    None => RoleStatus {
                        state: if deployed.executable {
                            RoleState::NotStarted
                        } else {
                            RoleState::Written
                        },
                        path: deployed.path.clone(),
                        pid: None,
                        exit_code: None,
                    },
                };
                (role.clone(), status)
            })
            .collect()
    }

    /// Status of a single role; `UnknownRole` if it was never deployed.
    pub fn role_status(&self, role: &str) -> Result<RoleStatus> {
        self.status()
            .remove(role)
            .ok_or_else(|| RunnerError::UnknownRole(role.to_string()))
    }

    /// Re-check every supervised process, then report status.
    pub fn refresh_status(&mut self) -> BTreeMap<Role, RoleStatus> {
        self.supervisor.refresh();
        self.status()
    }

    /// Re-check one role's process.
    pub fn is_running(&mut self, role: &str) -> bool {
        self.supervisor.is_running(role)
    }

    /// Number of supervised processes alive right now.
    pub fn running_count(&mut self) -> usize {
        self.supervisor.refresh()
    }

    /// Stop every process, then remove the workspace.
    ///
    /// Runs to completion whatever individual steps report. A second call
    /// does nothing and returns a report with `already_ended` set.
    pub async fn end(&mut self) -> TeardownReport {
        if self.phase == Phase::Ended {
            debug!("end() already ran; nothing to do");
            return TeardownReport {
                already_ended: true,
                ..TeardownReport::default()
            };
        }
        self.phase = Phase::Ended;

        let mut report = TeardownReport::default();

        for role in self.supervisor.roles() {
            let outcome = self
                .supervisor
                .terminate(&role, self.settings.terminate_timeout)
                .await;
            if let TerminateOutcome::Unkillable(reason) = &outcome {
                report.errors.push(RunnerError::TerminationError {
                    role: role.clone(),
                    reason: reason.clone(),
                });
            }
            report.stopped.push((role, outcome));
        }

        if let Some(workspace) = self.workspace.as_mut() {
            workspace.destroy();
            let location = workspace.location().to_path_buf();
            if location.exists() {
                report.errors.push(RunnerError::ResourceError(format!(
                    "workspace {:?} could not be fully removed",
                    location
                )));
            } else {
                report.workspace_removed = Some(location);
            }
        }

        if report.is_clean() {
            info!(stopped = report.stopped.len(), "teardown complete");
        } else {
            warn!(errors = report.errors.len(), "teardown finished with errors");
        }

        report
    }
}

impl Drop for LifecycleRun {
    fn drop(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        warn!("lifecycle run dropped without end(); forcing cleanup");
        self.supervisor.kill_all_now();
        if let Some(workspace) = self.workspace.as_mut() {
            workspace.destroy();
        }
        self.phase = Phase::Ended;
    }
}
