// src/types.rs

use std::fmt;

/// Logical slot an artifact is deployed into (e.g. `"backend"`).
pub type Role = String;

/// Lifecycle state of a role.
///
/// Executable roles move through
/// `NotStarted → Starting → Running → Stopping → Stopped`, with
/// `FailedToStart` reachable from `Starting`. Non-executable roles only ever
/// reach `Written`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    FailedToStart,
    Written,
}

impl RoleState {
    /// `Starting` and `Running` both occupy the role's single process slot.
    pub fn is_active(self) -> bool {
        matches!(self, RoleState::Starting | RoleState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleState::NotStarted => "not_started",
            RoleState::Starting => "starting",
            RoleState::Running => "running",
            RoleState::Stopping => "stopping",
            RoleState::Stopped => "stopped",
            RoleState::FailedToStart => "failed_to_start",
            RoleState::Written => "written",
        }
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `terminate` had to do to bring a role to `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// No process was tracked for the role.
    NotTracked,
    /// The process had already exited before termination was requested.
    AlreadyExited(Option<i32>),
    /// The process exited within the timeout after the graceful signal.
    Graceful(Option<i32>),
    /// The process ignored the graceful signal and was killed.
    Killed,
    /// Neither the graceful signal nor the kill brought the process down.
    Unkillable(String),
}
