use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::blob::{BlobStore, BlobStoreError};
use crate::context::ServiceContext;
use crate::db::{request_repo, DatabaseError};
use crate::executor::{DispatchError, JobExecutor, JobPayload};
use crate::request::{RequestId, RequestStatus, RestoreRequest};
use crate::sanitize;
use crate::target::{CatalogError, TargetCatalog};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Target {0} not found")]
    TargetNotFound(i64),

    #[error("Restore already registered for target {0}")]
    DuplicateActiveRequest(i64),

    #[error("Remote object not found: {key}")]
    RemoteObjectNotFound { key: String },

    #[error("Remote storage error: {0}")]
    RemoteSystemError(#[source] BlobStoreError),

    #[error("Failed to dispatch restore request {request_id}: {source}")]
    DispatchFailure {
        request_id: RequestId,
        #[source]
        source: DispatchError,
    },

    #[error("Restore request {0} not found")]
    RequestNotFound(RequestId),

    #[error("Restore request {request_id} is {status}, only failed requests can be redispatched")]
    NotRedispatchable {
        request_id: RequestId,
        status: RequestStatus,
    },

    #[error("Target catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl SubmissionError {
    /// Message handed back to API callers.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::TargetNotFound(_) => "Target not found",
            Self::DuplicateActiveRequest(_) => "Restore already registered for target",
            Self::RemoteObjectNotFound { .. } => "File not found",
            Self::RemoteSystemError(_) => "Exception communicating with remote storage",
            Self::RequestNotFound(_) => "Restore not found",
            Self::NotRedispatchable { .. } => "Restore is not in a failed state",
            Self::DispatchFailure { .. } | Self::Catalog(_) | Self::Database(_) => {
                "Unable to schedule restore"
            }
        }
    }
}

/// Validates restore submissions and hands accepted ones to the executor.
pub struct SubmissionGuard {
    ctx: ServiceContext,
    blob_store: Arc<dyn BlobStore>,
    catalog: Arc<dyn TargetCatalog>,
    executor: Arc<dyn JobExecutor>,
}

impl SubmissionGuard {
    pub fn new(
        ctx: ServiceContext,
        blob_store: Arc<dyn BlobStore>,
        catalog: Arc<dyn TargetCatalog>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            ctx,
            blob_store,
            catalog,
            executor,
        }
    }

    pub fn submit(
        &self,
        target_entity_id: i64,
        remote_key: &str,
    ) -> Result<RequestId, SubmissionError> {
        if !self.catalog.exists(target_entity_id)? {
            return Err(SubmissionError::TargetNotFound(target_entity_id));
        }

        // Advisory; the active-target index catches the race below.
        if request_repo::exists_active_for_target(&self.ctx.db, target_entity_id)? {
            return Err(SubmissionError::DuplicateActiveRequest(target_entity_id));
        }

        self.check_remote_object(remote_key)?;

        let mut request = RestoreRequest::new(target_entity_id, remote_key);
        let request_id = request_repo::insert(&self.ctx.db, &mut request)
            .map_err(|e| duplicate_or_database(e, target_entity_id))?;

        info!(
            request_id,
            target_entity_id,
            key = %sanitize::redact_key(remote_key),
            "Restore request created"
        );

        self.dispatch(request)
    }

    /// Puts a failed request back on the queue under the same id.
    pub fn redispatch(&self, request_id: RequestId) -> Result<RequestId, SubmissionError> {
        let mut request = request_repo::find_by_id(&self.ctx.db, request_id)?
            .ok_or(SubmissionError::RequestNotFound(request_id))?;

        if request.status != RequestStatus::Failed {
            return Err(SubmissionError::NotRedispatchable {
                request_id,
                status: request.status,
            });
        }

        let target_entity_id = request.target_entity_id;
        request.set_status(RequestStatus::TaskWaiting);
        request.job_id = None;
        request.apply_run_id = None;
        request_repo::save(&self.ctx.db, &mut request)
            .map_err(|e| duplicate_or_database(e, target_entity_id))?;

        info!(request_id, target_entity_id, "Restore request redispatched");
        self.dispatch(request)
    }

    fn check_remote_object(&self, remote_key: &str) -> Result<(), SubmissionError> {
        if remote_key.trim().is_empty() {
            return Err(SubmissionError::RemoteObjectNotFound {
                key: remote_key.to_string(),
            });
        }

        match self.blob_store.exists(remote_key) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SubmissionError::RemoteObjectNotFound {
                key: sanitize::redact_key(remote_key),
            }),
            Err(BlobStoreError::NotFound { .. }) => Err(SubmissionError::RemoteObjectNotFound {
                key: sanitize::redact_key(remote_key),
            }),
            Err(e) => {
                warn!(error = %e, "Remote storage check failed");
                Err(SubmissionError::RemoteSystemError(e))
            }
        }
    }

    fn dispatch(&self, mut request: RestoreRequest) -> Result<RequestId, SubmissionError> {
        let request_id = request.id.ok_or(DatabaseError::NotPersisted)?;

        match self.executor.enqueue(JobPayload::new(request_id)) {
            Ok(job_id) => {
                // The worker may already have moved the request on; only the
                // job id and a still-waiting status are written here.
                request_repo::mark_dispatched(&self.ctx.db, request_id, &job_id)?;
                info!(request_id, job_id = %job_id, "Restore job queued");
                Ok(request_id)
            }
            Err(source) => {
                warn!(request_id, error = %source, "Restore job could not be queued");
                request.mark_failed("dispatch failed");
                request_repo::save(&self.ctx.db, &mut request)?;
                Err(SubmissionError::DispatchFailure { request_id, source })
            }
        }
    }
}

fn duplicate_or_database(error: DatabaseError, target_entity_id: i64) -> SubmissionError {
    match error {
        DatabaseError::ActiveRequestExists { .. } => {
            SubmissionError::DuplicateActiveRequest(target_entity_id)
        }
        other => SubmissionError::Database(other),
    }
}
