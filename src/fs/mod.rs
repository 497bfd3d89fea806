// src/fs/mod.rs

//! Filesystem seam used by the state store.
//!
//! Production code uses [`RealFileSystem`]; tests swap in
//! [`mock::MockFileSystem`] to simulate a crash in the middle of a save.

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

pub mod mock;

/// The handful of operations an atomic write-temp-then-rename needs.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Create or truncate `path`, write `contents` and flush them to stable
    /// storage before returning.
    fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write_synced(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file =
            fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents)
            .with_context(|| format!("writing to file {:?}", path))?;
        file.sync_all()
            .with_context(|| format!("syncing file {:?}", path))?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| format!("renaming {:?} to {:?}", from, to))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
