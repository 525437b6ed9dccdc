// src/artifact/generator.rs

//! Where artifacts come from.
//!
//! The runner never inspects generated code; a [`Generator`] just hands over
//! [`Artifact`] values. Two implementations ship with the crate:
//! - [`ConfigGenerator`] materialises the `[artifact.<role>]` tables of a
//!   config file, reading `source` files relative to the config directory.
//! - [`StaticGenerator`] returns canned artifacts for offline demos.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::artifact::Artifact;
use crate::config::ArtifactConfig;
use crate::errors::{Result, RunnerError};
use crate::fs::{FileSystem, RealFileSystem};

/// Supplier of generated artifacts.
pub trait Generator: Send + Sync {
    fn generate(&self) -> Result<Vec<Artifact>>;
}

/// Builds artifacts from validated config tables.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    artifacts: BTreeMap<String, ArtifactConfig>,
    base_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl ConfigGenerator {
    pub fn new(artifacts: BTreeMap<String, ArtifactConfig>, base_dir: impl Into<PathBuf>) -> Self {
        Self::with_fs(artifacts, base_dir, Arc::new(RealFileSystem))
    }

    pub fn with_fs(
        artifacts: BTreeMap<String, ArtifactConfig>,
        base_dir: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            artifacts,
            base_dir: base_dir.into(),
            fs,
        }
    }

    fn resolve_source(&self, source: &Path) -> PathBuf {
        if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.base_dir.join(source)
        }
    }
}

impl Generator for ConfigGenerator {
    fn generate(&self) -> Result<Vec<Artifact>> {
        let mut out = Vec::with_capacity(self.artifacts.len());

        for (role, cfg) in self.artifacts.iter() {
            let content = match (&cfg.content, &cfg.source) {
                (Some(inline), _) => inline.clone(),
                (None, Some(source)) => {
                    let path = self.resolve_source(source);
                    debug!(role = %role, source = %path.display(), "reading artifact source");
                    self.fs.read_to_string(&path).map_err(|e| {
                        RunnerError::IoError(format!(
                            "reading source for artifact '{role}': {e:#}"
                        ))
                    })?
                }
                (None, None) => {
                    return Err(RunnerError::ConfigError(format!(
                        "artifact '{role}' has no content"
                    )));
                }
            };

            out.push(Artifact {
                role: role.clone(),
                filename: cfg.file.clone(),
                content,
                executable: cfg.executable,
                launcher: cfg.launcher.clone().unwrap_or_default(),
                args: cfg.args.clone(),
            });
        }

        Ok(out)
    }
}

/// Canned artifacts for running the pipeline without any model behind it.
///
/// The backend is a POSIX shell service that stays alive until signalled;
/// the frontend is a static purchase-request form.
#[derive(Debug, Clone, Default)]
pub struct StaticGenerator;

const DEMO_BACKEND: &str = r#"#!/bin/sh
# Purchase request approval service (canned demo build).
echo "purchase-approval backend up (pid $$)"
trap 'echo "purchase-approval backend stopping"; exit 0' TERM INT
while true; do
  sleep 1
done
"#;

const DEMO_FRONTEND: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Purchase Request</title>
</head>
<body>
  <h1>Purchase Request</h1>
  <form id="purchase-request">
    <label>Requester <input name="requester" required></label>
    <label>Department <input name="department" required></label>
    <label>Item <input name="item" required></label>
    <label>Amount <input name="amount" type="number" min="0.01" step="0.01" required></label>
    <label>Justification <textarea name="justification" required></textarea></label>
    <button type="submit">Submit for approval</button>
  </form>
</body>
</html>
"#;

impl Generator for StaticGenerator {
    fn generate(&self) -> Result<Vec<Artifact>> {
        Ok(vec![
            Artifact::executable("backend", "backend.sh", DEMO_BACKEND).with_launcher(["sh"]),
            Artifact::static_file("frontend", "index.html", DEMO_FRONTEND),
        ])
    }
}
