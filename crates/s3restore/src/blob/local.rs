//! Directory-backed blob store.
//!
//! Keys are relative paths under a root directory. Used for development
//! setups without object storage and throughout the test suite.

use std::path::{Component, Path, PathBuf};

use super::{BlobStore, BlobStoreError};
use crate::sanitize;

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path inside the root. Keys that are absolute or
    /// climb out of the root resolve to nothing.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let inside = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        inside.then(|| self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        if !self.root.is_dir() {
            return Err(BlobStoreError::NotConfigured(format!(
                "root directory '{}' does not exist",
                self.root.display()
            )));
        }
        Ok(self.resolve(key).is_some_and(|p| p.is_file()))
    }

    fn fetch(&self, key: &str, dest_dir: &Path) -> Result<PathBuf, BlobStoreError> {
        let source = self
            .resolve(key)
            .filter(|p| p.is_file())
            .ok_or_else(|| BlobStoreError::NotFound {
                key: key.to_string(),
            })?;

        let dest = dest_dir.join(sanitize::file_name_for_key(key));
        std::fs::copy(&source, &dest).map_err(|e| BlobStoreError::Io {
            path: dest.clone(),
            source: e,
        })?;

        log::debug!(
            "Copied {} into {}",
            sanitize::redact_key(key),
            sanitize::redact_path(&dest)
        );
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_file(key: &str, content: &[u8]) -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        let store = LocalBlobStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_exists() {
        let (_dir, store) = store_with_file("backups/a.tar.gz", b"x");
        assert!(store.exists("backups/a.tar.gz").unwrap());
        assert!(!store.exists("backups/missing.tar.gz").unwrap());
        assert!(!store.exists("").unwrap());
    }

    #[test]
    fn test_exists_rejects_escaping_keys() {
        let (_dir, store) = store_with_file("a.tar.gz", b"x");
        assert!(!store.exists("../a.tar.gz").unwrap());
        assert!(!store.exists("/etc/passwd").unwrap());
    }

    #[test]
    fn test_missing_root_is_not_configured() {
        let store = LocalBlobStore::new("/nonexistent/blob/root");
        let err = store.exists("a").unwrap_err();
        assert!(err.is_communication());
    }

    #[test]
    fn test_fetch_copies_into_destination() {
        let (_dir, store) = store_with_file("backups/course 1.tar.gz", b"payload");
        let dest = TempDir::new().unwrap();

        let path = store.fetch("backups/course 1.tar.gz", dest.path()).unwrap();
        assert_eq!(path, dest.path().join("course_1.tar.gz"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_fetch_missing_key() {
        let (_dir, store) = store_with_file("a.tar.gz", b"x");
        let dest = TempDir::new().unwrap();
        let err = store.fetch("b.tar.gz", dest.path()).unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound { .. }));
        assert!(!err.is_communication());
    }
}
