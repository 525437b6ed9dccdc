use std::io;
use std::sync::{Arc, Mutex};

use scratchrun::exec::Signaller;
use tokio::process::Child;

/// A signaller that:
/// - records every signal it was asked to send
/// - never delivers any of them, so the target process keeps running.
///
/// Processes supervised through it must be cleaned up with
/// [`kill_process_group`] at the end of the test.
#[derive(Debug, Clone, Default)]
pub struct DeafSignaller {
    sent: Arc<Mutex<Vec<String>>>,
}

impl DeafSignaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals requested so far, e.g. `"term 1234"`, `"kill 1234"`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, what: String) {
        self.sent.lock().unwrap().push(what);
    }
}

impl Signaller for DeafSignaller {
    fn terminate_group(&self, pid: u32) -> io::Result<()> {
        self.record(format!("term {pid}"));
        Ok(())
    }

    fn kill_group(&self, pid: u32) -> io::Result<()> {
        self.record(format!("kill {pid}"));
        Ok(())
    }

    fn kill_child(&self, child: &mut Child) -> io::Result<()> {
        self.record(format!("kill-child {}", child.id().unwrap_or_default()));
        Ok(())
    }
}

/// SIGKILL the whole process group led by `pid`, bypassing any signaller.
#[cfg(unix)]
pub fn kill_process_group(pid: u32) {
    let _ = std::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stderr(std::process::Stdio::null())
        .status();
}
