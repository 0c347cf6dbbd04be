//! Caller-facing translation of submissions and status lookups.

use serde::Serialize;
use tracing::{error, info};

use crate::db::DatabaseError;
use crate::request::RequestId;
use crate::status::{CoarseStatus, DetailedStatus, StatusProjector};
use crate::submission::{SubmissionError, SubmissionGuard};

/// Outcome of `submit` and `redispatch`, serialised as
/// `{"status": "success", "requestId": 1}` or
/// `{"status": "error", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitResponse {
    Success {
        #[serde(rename = "requestId")]
        request_id: RequestId,
    },
    Error {
        message: String,
    },
}

impl SubmitResponse {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Success { request_id } => Some(*request_id),
            Self::Error { .. } => None,
        }
    }

    fn from_result(result: Result<RequestId, SubmissionError>) -> Self {
        match result {
            Ok(request_id) => Self::Success { request_id },
            Err(e) => {
                match &e {
                    SubmissionError::Database(_)
                    | SubmissionError::Catalog(_)
                    | SubmissionError::DispatchFailure { .. } => {
                        error!(error = %e, "Restore could not be scheduled")
                    }
                    _ => info!(error = %e, "Restore submission rejected"),
                }
                Self::Error {
                    message: e.client_message().to_string(),
                }
            }
        }
    }
}

pub struct RestoreApi {
    guard: SubmissionGuard,
    projector: StatusProjector,
}

impl RestoreApi {
    pub fn new(guard: SubmissionGuard, projector: StatusProjector) -> Self {
        Self { guard, projector }
    }

    pub fn submit(&self, target_entity_id: i64, remote_key: &str) -> SubmitResponse {
        SubmitResponse::from_result(self.guard.submit(target_entity_id, remote_key))
    }

    pub fn redispatch(&self, request_id: RequestId) -> SubmitResponse {
        SubmitResponse::from_result(self.guard.redispatch(request_id))
    }

    pub fn status(&self, request_id: RequestId) -> Result<CoarseStatus, DatabaseError> {
        self.projector.coarse_status(request_id)
    }

    pub fn detailed_status(&self, request_id: RequestId) -> Result<DetailedStatus, DatabaseError> {
        self.projector.detailed_status(request_id)
    }
}
