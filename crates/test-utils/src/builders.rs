#![allow(dead_code)]

use std::collections::BTreeMap;

use scratchrun::artifact::Artifact;
use scratchrun::config::{ArtifactConfig, ConfigFile, PreflightCheck, RawConfigFile};
use scratchrun::config::model::RawRunnerSection;

/// Builder for shell-script artifacts run through `sh`.
///
/// ```ignore
/// let backend = ArtifactBuilder::script("backend", "exec sleep 30").build();
/// ```
pub struct ArtifactBuilder {
    artifact: Artifact,
}

impl ArtifactBuilder {
    /// Executable `<role>.sh` launched with `sh`.
    pub fn script(role: &str, body: &str) -> Self {
        Self {
            artifact: Artifact::executable(role, format!("{role}.sh"), format!("{body}\n"))
                .with_launcher(["sh"]),
        }
    }

    /// Non-executable file with the given content.
    pub fn page(role: &str, filename: &str, content: &str) -> Self {
        Self {
            artifact: Artifact::static_file(role, filename, content),
        }
    }

    /// Script that stays up until terminated.
    pub fn long_running(role: &str) -> Self {
        Self::script(role, "exec sleep 30")
    }

    /// Script that ignores SIGTERM and must be killed.
    pub fn stubborn(role: &str) -> Self {
        Self::script(role, "trap '' TERM\nwhile true; do sleep 1; done")
    }

    /// Script that exits straight away with `code`.
    pub fn exits_with(role: &str, code: i32) -> Self {
        Self::script(role, &format!("exit {code}"))
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.artifact.filename = filename.to_string();
        self
    }

    pub fn build(self) -> Artifact {
        self.artifact
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                runner: RawRunnerSection::default(),
                preflight: Vec::new(),
                artifact: BTreeMap::new(),
            },
        }
    }

    pub fn with_artifact(mut self, role: &str, artifact: ArtifactConfig) -> Self {
        self.config.artifact.insert(role.to_string(), artifact);
        self
    }

    pub fn with_inline(self, role: &str, file: &str, content: &str) -> Self {
        self.with_artifact(
            role,
            ArtifactConfig {
                file: file.to_string(),
                content: Some(content.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn with_preflight(mut self, cmd: &str) -> Self {
        self.config.preflight.push(PreflightCheck {
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn with_grace_period(mut self, grace: &str) -> Self {
        self.config.runner.grace_period = grace.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
