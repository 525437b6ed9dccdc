// src/engine/mod.rs

//! Orchestration of a run.
//!
//! - [`controller`] holds `LifecycleRun`, the aggregate that sequences
//!   workspace allocation, artifact deployment, status and teardown.
//! - [`report`] is the push-style seam through which state changes reach a
//!   presentation layer.

pub mod controller;
pub mod report;

pub use controller::{DeployOutcome, LifecycleRun, RoleStatus, TeardownReport};
pub use report::{ChannelReporter, ConsoleReporter, Reporter, Transition};
