// src/artifact/mod.rs

//! Generated artifacts and how they reach the workspace.
//!
//! - [`Artifact`] is the immutable value handed over by a generator.
//! - [`writer`] persists artifacts into a [`Workspace`](crate::workspace::Workspace)
//!   behind a path-traversal guard.
//! - [`generator`] holds the `Generator` seam plus the config-backed and
//!   canned implementations.

pub mod generator;
pub mod writer;

pub use generator::{ConfigGenerator, Generator, StaticGenerator};
pub use writer::{ArtifactWriter, check_relative_filename};

use crate::types::Role;

/// An opaque blob of generated text bound to a role.
///
/// The content is never parsed or validated; it is written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub role: Role,
    /// Workspace-relative target path (may contain subdirectories).
    pub filename: String,
    pub content: String,
    /// Whether the artifact is launched as a long-running process. Static
    /// artifacts are only written and referenced.
    pub executable: bool,
    /// Program (plus leading arguments) used to run the file, e.g.
    /// `["python3"]`. Empty means the file itself is executed.
    pub launcher: Vec<String>,
    /// Extra arguments appended after the file path.
    pub args: Vec<String>,
}

impl Artifact {
    /// An artifact that is written and then launched as a process.
    pub fn executable(
        role: impl Into<Role>,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            filename: filename.into(),
            content: content.into(),
            executable: true,
            launcher: Vec::new(),
            args: Vec::new(),
        }
    }

    /// An artifact that is only written (e.g. a page to open in a browser).
    pub fn static_file(
        role: impl Into<Role>,
        filename: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            executable: false,
            ..Self::executable(role, filename, content)
        }
    }

    pub fn with_launcher<I, S>(mut self, launcher: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher = launcher.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}
