// src/artifact/writer.rs

//! Persist artifacts into the workspace.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::errors::{Result, RunnerError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::workspace::Workspace;

/// Validate that `filename` stays inside whatever directory it is joined to.
///
/// Rejects empty names, absolute paths, drive prefixes and any `..`
/// segment (with either separator). Returns the normalised relative path
/// with `.` segments removed.
pub fn check_relative_filename(filename: &str) -> Result<PathBuf> {
    if filename.split(['/', '\\']).any(|seg| seg == "..") {
        return Err(RunnerError::IoError(format!(
            "artifact filename {filename:?} contains a parent-directory segment"
        )));
    }

    let mut clean = PathBuf::new();
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(RunnerError::IoError(format!(
                    "artifact filename {filename:?} contains a parent-directory segment"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RunnerError::IoError(format!(
                    "artifact filename {filename:?} must be relative to the workspace"
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(RunnerError::IoError(format!(
            "artifact filename {filename:?} does not name a file"
        )));
    }

    Ok(clean)
}

/// Writes artifact content into a workspace through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    fs: Arc<dyn FileSystem>,
}

impl Default for ArtifactWriter {
    fn default() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }
}

impl ArtifactWriter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Write `artifact` to `workspace/artifact.filename`, overwriting any
    /// previous file, and return the absolute path.
    ///
    /// Executable artifacts without a launcher are also given the executable
    /// bit so they can be exec'd directly.
    pub fn write(&self, workspace: &Workspace, artifact: &Artifact) -> Result<PathBuf> {
        let root = workspace.path().ok_or_else(|| {
            RunnerError::IoError(format!(
                "workspace {:?} has already been destroyed",
                workspace.location()
            ))
        })?;

        let relative = check_relative_filename(&artifact.filename)?;
        let target = root.join(relative);

        debug!(
            role = %artifact.role,
            path = %target.display(),
            bytes = artifact.content.len(),
            "writing artifact"
        );

        self.fs
            .write(&target, artifact.content.as_bytes())
            .map_err(|e| RunnerError::IoError(format!("{e:#}")))?;

        if artifact.executable && artifact.launcher.is_empty() {
            self.fs
                .set_executable(&target)
                .map_err(|e| RunnerError::IoError(format!("{e:#}")))?;
        }

        info!(role = %artifact.role, path = %target.display(), "artifact saved");
        Ok(target)
    }
}
