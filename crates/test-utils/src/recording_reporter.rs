use std::sync::{Arc, Mutex};

use scratchrun::engine::{Reporter, Transition};
use scratchrun::types::RoleState;

/// Reporter that keeps every transition for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    seen: Arc<Mutex<Vec<Transition>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.seen.lock().unwrap().clone()
    }

    /// Target states reported for `role`, in order.
    pub fn states_for(&self, role: &str) -> Vec<RoleState> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.to)
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn transition(&self, transition: &Transition) {
        self.seen.lock().unwrap().push(transition.clone());
    }
}
