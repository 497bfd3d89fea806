// src/state/store.rs

//! Atomic JSON persistence for a single document.
//!
//! Saves write the full document to a sibling temp file, fsync it and rename
//! it over the target, so a reader (or a restarted daemon) sees either the
//! previous document or the new one, never a torn write.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{JobwardenError, Result};
use crate::fs::{FileSystem, RealFileSystem};

#[derive(Debug, Clone)]
pub struct StateStore<T> {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document, falling back to `T::default()` when the file is
    /// missing or cannot be parsed.
    pub fn load(&self) -> T {
        if !self.fs.exists(&self.path) {
            debug!(path = %self.path.display(), "no state file yet; starting empty");
            return T::default();
        }

        let contents = match self.fs.read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable state file; starting empty");
                return T::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt state file; starting empty");
                T::default()
            }
        }
    }

    /// Persist the full document atomically.
    pub fn save(&self, doc: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.temp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .map_err(|e| self.persist_error("creating state dir", e))?;
        }

        self.fs
            .write_synced(&tmp, &bytes)
            .map_err(|e| self.persist_error("writing temp file", e))?;

        if let Err(e) = self.fs.rename(&tmp, &self.path) {
            let _ = self.fs.remove_file(&tmp);
            return Err(self.persist_error("replacing state file", e));
        }

        Ok(())
    }

    /// `.<file-name>.<pid>.tmp` next to the target, so the rename never
    /// crosses a filesystem boundary.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", std::process::id()))
    }

    fn persist_error(&self, what: &str, err: anyhow::Error) -> JobwardenError {
        JobwardenError::PersistenceError(format!("{what} for {}: {err:#}", self.path.display()))
    }
}
