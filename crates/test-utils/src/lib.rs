pub mod builders;
pub mod fake_signaller;
pub mod recording_reporter;

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use scratchrun::config::RunnerSettings;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 15-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(15), f)
        .await
        .expect("Test timed out after 15 seconds")
}

/// Settings with short timings so lifecycle tests stay quick. Workspaces
/// are allocated under `scratch`.
pub fn fast_settings(scratch: &Path) -> RunnerSettings {
    RunnerSettings {
        grace_period: Duration::from_millis(300),
        terminate_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(50),
        workspace_prefix: "scratchrun_test_".to_string(),
        scratch_dir: Some(scratch.to_path_buf()),
    }
}

/// Scratch directories directly under `scratch` whose name starts with
/// the test prefix, i.e. workspaces that have not been cleaned up.
pub fn leftover_workspaces(scratch: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = std::fs::read_dir(scratch) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("scratchrun_test_"))
        })
        .collect()
}

/// Whether a process with `pid` is still alive. Zombies count as dead.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // State is the first field after the parenthesised command name.
        return stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X");
    }
    if Path::new("/proc/self").exists() {
        return false;
    }
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
