//! Scratch directories for a single job run.
//!
//! A `ScratchDir` owns a freshly created directory under the configured
//! scratch root and removes it when dropped, so every exit path of the
//! pipeline releases its temporary files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::StorageError;

pub struct ScratchDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Creates `<root>/<label>-XXXXXX`, creating `root` first if needed.
    pub fn create(root: &Path, label: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root).map_err(|e| StorageError::CreateDirectory {
            path: root.to_path_buf(),
            source: e,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", label))
            .tempdir_in(root)
            .map_err(|e| StorageError::CreateDirectory {
                path: root.join(label),
                source: e,
            })?;

        log::debug!("Created scratch directory {}", dir.path().display());

        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory now and reports failure to the caller.
    pub fn release(mut self) -> Result<(), StorageError> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|e| StorageError::RemoveDirectory {
                path: self.path.clone(),
                source: e,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                log::warn!(
                    "Failed to remove scratch directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
