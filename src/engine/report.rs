// src/engine/report.rs

//! Push-style notifications of role state changes.
//!
//! The lifecycle never waits on a reporter and works the same with none
//! attached; reporters only observe.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{Role, RoleState};

/// One state change of one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub role: Role,
    pub from: RoleState,
    pub to: RoleState,
    /// Free-form context: pid, exit code, path, error text.
    pub detail: Option<String>,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.role, self.from, self.to)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Receiver of lifecycle transitions.
///
/// Implementations must return promptly; they run inline with the
/// lifecycle.
pub trait Reporter: Send + Sync {
    fn transition(&self, transition: &Transition);
}

/// Deliver a transition to `reporter`, if any. Self-transitions are skipped.
pub(crate) fn notify(
    reporter: &Option<Arc<dyn Reporter>>,
    role: &str,
    from: RoleState,
    to: RoleState,
    detail: Option<String>,
) {
    if from == to {
        return;
    }
    if let Some(reporter) = reporter {
        reporter.transition(&Transition {
            role: role.to_string(),
            from,
            to,
            detail,
        });
    }
}

/// Prints one line per transition on stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn transition(&self, transition: &Transition) {
        println!("{transition}");
    }
}

/// Forwards transitions into a bounded channel without ever blocking.
///
/// When the channel is full or closed the transition is dropped.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<Transition>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<Transition>) -> Self {
        Self { tx }
    }

    /// Convenience: build a reporter plus its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Transition>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl Reporter for ChannelReporter {
    fn transition(&self, transition: &Transition) {
        if let Err(e) = self.tx.try_send(transition.clone()) {
            debug!(role = %transition.role, error = %e, "dropping lifecycle transition");
        }
    }
}
