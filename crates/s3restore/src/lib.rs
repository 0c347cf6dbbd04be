pub mod api;
pub mod archive;
pub mod blob;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod request;
pub mod sanitize;
pub mod secrets;
pub mod status;
pub mod storage;
pub mod submission;
pub mod target;

pub use api::{RestoreApi, SubmitResponse};
pub use archive::{ApplyError, ApplyPlan, ApplyRules, ArchiveApplier};
pub use blob::{BlobStore, BlobStoreError, LocalBlobStore, S3BlobStore};
pub use config::{load_config, Config};
pub use context::ServiceContext;
pub use error::{ConfigError, RestoreError, Result, StorageError, WorkerError};
pub use executor::{JobExecutor, JobHandler, JobId, JobPayload, WorkerPool};
pub use pipeline::{ProgressReporter, RestoreJobRunner};
pub use request::{RequestId, RequestStatus, RestoreRequest};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use status::{CoarseStatus, DetailedStatus, StatusProjector};
pub use submission::{SubmissionError, SubmissionGuard};
pub use target::{CatalogError, MemoryCatalog, TargetCatalog};
