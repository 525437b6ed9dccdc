// src/config/mod.rs

//! Configuration loading and validation for scratchrun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into strongly typed settings (`validate.rs`).
//! - Parse human duration strings like `"3s"` (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{ArtifactConfig, ConfigFile, PreflightCheck, RawConfigFile, RunnerSettings};
