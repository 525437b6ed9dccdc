// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! The lifecycle surfaces four operational kinds of failure:
//! - `ResourceError`: the workspace could not be allocated or removed.
//! - `IoError`: an artifact could not be written (including the traversal
//!   guard rejecting its filename).
//! - `LaunchError`: a child process could not be spawned or exited during
//!   the grace period.
//! - `TerminationError`: graceful stop and forceful kill both failed.
//!
//! The remaining variants cover configuration and preflight problems that
//! happen before a run exists.

use thiserror::Error;

use crate::types::Role;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Workspace error: {0}")]
    ResourceError(String),

    #[error("Artifact IO error: {0}")]
    IoError(String),

    #[error("Launch error for role '{role}': {reason}{}", fmt_exit_code(.exit_code))]
    LaunchError {
        role: Role,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Termination error for role '{role}': {reason}")]
    TerminationError { role: Role, reason: String },

    #[error("Role '{0}' already has a starting or running process")]
    RoleBusy(Role),

    #[error("Unknown role: {0}")]
    UnknownRole(Role),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Preflight check failed: {0}")]
    PreflightError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => String::new(),
    }
}

impl RunnerError {
    /// Exit code attached to a launch failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunnerError::LaunchError { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunnerError>;
