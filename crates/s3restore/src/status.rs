use std::fmt;

use serde::Serialize;

use crate::db::{request_repo, Database, DatabaseError};
use crate::request::{RequestId, RequestStatus, RestoreRequest};

/// Status reported to callers that only need to know whether to keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoarseStatus {
    NotFound,
    Pending,
    InProgress,
    Failed,
    Complete,
    UnknownStatus,
}

impl CoarseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "notfound",
            Self::Pending => "pending",
            Self::InProgress => "inprogress",
            Self::Failed => "failed",
            Self::Complete => "complete",
            Self::UnknownStatus => "unknownstatus",
        }
    }

    fn of(status: RequestStatus) -> Self {
        match status {
            RequestStatus::New | RequestStatus::TaskWaiting => Self::Pending,
            RequestStatus::Downloading | RequestStatus::Extracting | RequestStatus::Restoring => {
                Self::InProgress
            }
            RequestStatus::Complete => Self::Complete,
            RequestStatus::Failed | RequestStatus::RestoreFailed | RequestStatus::Error => {
                Self::Failed
            }
            RequestStatus::Unknown(_) => Self::UnknownStatus,
        }
    }
}

impl fmt::Display for CoarseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-level status with progress and failure text where they apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatus {
    pub status: &'static str,
    /// Percent complete with one decimal, only while restoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DetailedStatus {
    fn not_found() -> Self {
        Self {
            status: "notfound",
            progress: None,
            error_message: None,
        }
    }

    fn of(request: &RestoreRequest) -> Self {
        let status = match request.status {
            RequestStatus::New | RequestStatus::TaskWaiting => "pending",
            RequestStatus::Downloading => "downloading",
            RequestStatus::Extracting => "extracting",
            RequestStatus::Restoring => "restoring",
            RequestStatus::Complete => "complete",
            RequestStatus::Failed => "failed",
            RequestStatus::RestoreFailed => "restorefailed",
            RequestStatus::Error => "error",
            RequestStatus::Unknown(_) => "unknownstatus",
        };

        let progress = match request.status {
            RequestStatus::Restoring => Some(as_percent(request.progress.unwrap_or(0.0))),
            _ => None,
        };

        let error_message = if request.status.is_failure() {
            request.error_message.clone()
        } else {
            None
        };

        Self {
            status,
            progress,
            error_message,
        }
    }
}

fn as_percent(fraction: f64) -> f64 {
    (fraction.clamp(0.0, 1.0) * 1000.0).round() / 10.0
}

/// Read-only projection of stored requests into caller-facing statuses.
#[derive(Clone)]
pub struct StatusProjector {
    db: Database,
}

impl StatusProjector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn coarse_status(&self, request_id: RequestId) -> Result<CoarseStatus, DatabaseError> {
        Ok(match request_repo::find_by_id(&self.db, request_id)? {
            Some(request) => CoarseStatus::of(request.status),
            None => CoarseStatus::NotFound,
        })
    }

    pub fn detailed_status(&self, request_id: RequestId) -> Result<DetailedStatus, DatabaseError> {
        Ok(match request_repo::find_by_id(&self.db, request_id)? {
            Some(request) => DetailedStatus::of(&request),
            None => DetailedStatus::not_found(),
        })
    }
}
