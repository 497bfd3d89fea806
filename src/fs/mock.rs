// src/fs/mock.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use super::FileSystem;

/// Where an injected crash interrupts a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrashPoint {
    /// Writes and renames behave normally.
    #[default]
    Never,
    /// Half of the bytes land in the file being written, then the write fails.
    MidWrite,
    /// The temp file is fully written but the rename never happens.
    BeforeRename,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, Vec<u8>>,
    crash: CrashPoint,
    renames: usize,
}

/// In-memory filesystem with crash injection.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock()
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).cloned()
    }

    /// All paths currently present, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn crash_at(&self, point: CrashPoint) {
        self.lock().crash = point;
    }

    /// Number of successful renames so far.
    pub fn rename_count(&self) -> usize {
        self.lock().renames
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        match state.files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.crash == CrashPoint::MidWrite {
            let partial = contents[..contents.len() / 2].to_vec();
            state.files.insert(path.to_path_buf(), partial);
            return Err(anyhow!("simulated crash while writing {:?}", path));
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.crash == CrashPoint::BeforeRename {
            return Err(anyhow!("simulated crash before renaming {:?}", from));
        }
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        state.files.insert(to.to_path_buf(), content);
        state.renames += 1;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        // A crashed process does not get to clean up after itself.
        if state.crash != CrashPoint::Never {
            return Err(anyhow!("simulated crash; {:?} left behind", path));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }
}
