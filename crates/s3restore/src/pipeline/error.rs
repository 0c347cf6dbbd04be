use thiserror::Error;

use crate::archive::{ApplyError, ArchiveError};
use crate::blob::BlobStoreError;
use crate::db::DatabaseError;
use crate::error::StorageError;
use crate::request::RequestId;

/// Failure of one pipeline run. The display text is what gets stored as
/// the request's error message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not download archive: {0}")]
    Download(#[source] BlobStoreError),

    #[error("could not unpack archive: {0}")]
    Unpack(#[source] ArchiveError),

    #[error("missing manifest in unpacked archive")]
    MissingManifest { manifest: String },

    #[error("could not prepare scratch directory: {0}")]
    Scratch(#[from] StorageError),

    #[error("restore failed: {0}")]
    Apply(#[source] ApplyError),

    #[error("could not persist restore request: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("restore request {0} disappeared during processing")]
    RequestMissing(RequestId),
}

impl PipelineError {
    /// Trace detail worth keeping next to the error message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Apply(e) => e.detail.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineWarning {
    Precheck { message: String },
    ContingentLookupFailed { error: String },
    ContingentCleanupFailed { resource_id: i64, error: String },
    ScratchCleanupFailed { error: String },
}
