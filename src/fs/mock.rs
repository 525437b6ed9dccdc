// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory filesystem for tests.
///
/// Writes can be switched to fail (`fail_writes(true)`) to exercise the
/// "disk full / permission denied" paths without touching the real disk.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    executable: Arc<Mutex<HashSet<PathBuf>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_executable(&self, path: &Path) -> bool {
        let exec = self.executable.lock().unwrap_or_else(|e| e.into_inner());
        exec.contains(path)
    }

    pub fn file_count(&self) -> usize {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.len()
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("No space left on device: {:?}", path));
        }
        self.add_file(path, contents);
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> Result<()> {
        if !self.exists(path) {
            return Err(anyhow!("File not found: {:?}", path));
        }
        let mut exec = self.executable.lock().unwrap_or_else(|e| e.into_inner());
        exec.insert(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(path)
    }
}
