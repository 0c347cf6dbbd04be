//! Remote object storage holding the archives to restore.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("Remote object '{key}' not found")]
    NotFound { key: String },

    #[error("Remote storage is not configured: {0}")]
    NotConfigured(String),

    #[error("Communication with remote storage failed: {0}")]
    Communication(String),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BlobStoreError {
    /// True for failures talking to the store, as opposed to a missing object
    /// or a local write problem.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication(_) | Self::NotConfigured(_))
    }
}

/// A store that can answer whether a key exists and copy it locally.
pub trait BlobStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;

    /// Downloads `key` into `dest_dir` and returns the path of the local copy.
    fn fetch(&self, key: &str, dest_dir: &Path) -> Result<PathBuf, BlobStoreError>;
}
