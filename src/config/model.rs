// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [runner]
/// grace_period = "3s"
/// terminate_timeout = "5s"
///
/// [[preflight]]
/// cmd = "python3 --version"
///
/// [artifact.backend]
/// file = "main.py"
/// source = "generated/main.py"
/// executable = true
/// launcher = ["python3"]
///
/// [artifact.frontend]
/// file = "index.html"
/// content = "<html></html>"
/// ```
///
/// All sections are optional at parse time; validation requires at least
/// one artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RawRunnerSection,

    #[serde(default)]
    pub preflight: Vec<PreflightCheck>,

    /// Artifacts keyed by role name (`[artifact.<role>]`).
    #[serde(default)]
    pub artifact: BTreeMap<String, ArtifactConfig>,
}

/// `[runner]` section, durations still as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRunnerSection {
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    #[serde(default = "default_terminate_timeout")]
    pub terminate_timeout: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,

    /// Where workspaces are allocated; platform temp dir when absent.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_grace_period() -> String {
    "3s".to_string()
}

fn default_terminate_timeout() -> String {
    "5s".to_string()
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_workspace_prefix() -> String {
    "scratchrun_".to_string()
}

impl Default for RawRunnerSection {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            terminate_timeout: default_terminate_timeout(),
            poll_interval: default_poll_interval(),
            workspace_prefix: default_workspace_prefix(),
            scratch_dir: None,
        }
    }
}

/// `[[preflight]]` entry: a shell command that must succeed before the
/// workspace is created.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PreflightCheck {
    pub cmd: String,
}

/// `[artifact.<role>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArtifactConfig {
    /// Workspace-relative target filename.
    pub file: String,

    /// File holding the generated content, relative to the config file.
    #[serde(default)]
    pub source: Option<PathBuf>,

    /// Inline generated content.
    #[serde(default)]
    pub content: Option<String>,

    /// Launch as a supervised process after writing.
    #[serde(default)]
    pub executable: bool,

    /// Interpreter used to run the file (e.g. `["python3"]`).
    #[serde(default)]
    pub launcher: Option<Vec<String>>,

    #[serde(default)]
    pub args: Vec<String>,
}

/// Validated runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Fixed wait after spawning before the first liveness check. There is
    /// no readiness check: generated artifacts have no health contract.
    pub grace_period: Duration,
    /// How long a graceful stop may take before the process is killed.
    pub terminate_timeout: Duration,
    /// Interval of the observe loop's liveness polling.
    pub poll_interval: Duration,
    pub workspace_prefix: String,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(3),
            terminate_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            workspace_prefix: default_workspace_prefix(),
            scratch_dir: None,
        }
    }
}

impl RunnerSettings {
    /// Directory under which workspaces are allocated.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Fully validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub runner: RunnerSettings,
    pub preflight: Vec<PreflightCheck>,
    pub artifact: BTreeMap<String, ArtifactConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        runner: RunnerSettings,
        preflight: Vec<PreflightCheck>,
        artifact: BTreeMap<String, ArtifactConfig>,
    ) -> Self {
        Self {
            runner,
            preflight,
            artifact,
        }
    }
}
