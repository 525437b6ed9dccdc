// src/workspace.rs

//! Scoped scratch directory owning every file of one lifecycle run.
//!
//! The directory name comes from `tempfile`, so concurrent runs sharing the
//! same scratch root never collide. Removal is best-effort and idempotent:
//! it runs during shutdown, where raising would hide whatever failure is
//! already being handled.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::errors::{Result, RunnerError};

#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Allocate a fresh, uniquely named directory under `scratch_root`.
    pub fn create(scratch_root: &Path, prefix: &str) -> Result<Self> {
        let scratch_root = std::path::absolute(scratch_root).map_err(|e| {
            RunnerError::ResourceError(format!("cannot resolve scratch root {:?}: {e}", scratch_root))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&scratch_root)
            .map_err(|e| {
                RunnerError::ResourceError(format!(
                    "cannot allocate workspace under {:?}: {e}",
                    scratch_root
                ))
            })?;

        let path = dir.path().to_path_buf();
        info!(path = %path.display(), "workspace created");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Directory location; `None` once the workspace has been destroyed.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Where the workspace lives (or lived). Useful for post-mortem messages.
    pub fn location(&self) -> &Path {
        &self.path
    }

    pub fn is_destroyed(&self) -> bool {
        self.dir.is_none()
    }

    /// Recursively remove the directory tree.
    ///
    /// Calling this again after a successful or failed removal is a no-op.
    /// Failures are logged, never returned; callers that care can check
    /// whether [`location`](Self::location) still exists afterwards.
    pub fn destroy(&mut self) {
        let Some(dir) = self.dir.take() else {
            debug!(path = %self.path.display(), "workspace already destroyed");
            return;
        };

        match dir.close() {
            Ok(()) => info!(path = %self.path.display(), "workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "workspace was already gone");
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "workspace removal incomplete; retrying once"
                );
                if let Err(e) = std::fs::remove_dir_all(&self.path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "could not remove workspace; leaving it behind"
                        );
                    }
                }
            }
        }
    }
}
