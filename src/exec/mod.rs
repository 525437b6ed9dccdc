// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`process`] spawns children with `tokio::process::Command`, drains
//!   their output and delivers termination signals.
//! - [`supervisor`] owns the per-role state machine: one live process per
//!   role, grace-period liveness check, graceful-then-forceful termination.
//! - [`preflight`] runs the environment checks configured to gate a run.

pub mod preflight;
pub mod process;
pub mod supervisor;

pub use preflight::{PreflightReport, run_preflight};
pub use process::{LaunchCommand, OsSignaller, Signaller};
pub use supervisor::{LaunchOutcome, ProcessSnapshot, Supervisor};
