//! The restore request entity and its lifecycle.
//!
//! A request moves forward through
//! `New -> TaskWaiting -> Downloading -> Extracting -> Restoring -> Complete`.
//! `Failed` is reachable from dispatch, download and extraction,
//! `RestoreFailed` only from `Restoring`. The only backwards edge is an
//! explicit re-dispatch of a `Failed` request.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Database identifier of a restore request.
pub type RequestId = i64;

/// Free-form side channel persisted alongside the fixed fields.
pub type Metadata = BTreeMap<String, Value>;

const META_ERROR_DETAIL: &str = "error_detail";
const META_SKIPPED_SETTINGS: &str = "skipped_settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    New,
    TaskWaiting,
    Downloading,
    Extracting,
    Restoring,
    Complete,
    Failed,
    RestoreFailed,
    /// Recognised generic failure. Never written by the job runner or the
    /// submission guard, only projected when found in storage.
    Error,
    /// A stored code this build does not know about.
    Unknown(i64),
}

impl RequestStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::New => 0,
            Self::TaskWaiting => 1,
            Self::Downloading => 2,
            Self::Extracting => 3,
            Self::Restoring => 4,
            Self::Complete => 5,
            Self::Failed => 6,
            Self::RestoreFailed => 7,
            Self::Error => 8,
            Self::Unknown(code) => code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::New,
            1 => Self::TaskWaiting,
            2 => Self::Downloading,
            3 => Self::Extracting,
            4 => Self::Restoring,
            5 => Self::Complete,
            6 => Self::Failed,
            7 => Self::RestoreFailed,
            8 => Self::Error,
            other => Self::Unknown(other),
        }
    }

    /// True while the request blocks new submissions for its target.
    pub fn is_active(self) -> bool {
        (0..=Self::Restoring.code()).contains(&self.code())
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::RestoreFailed | Self::Error)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete) || self.is_failure()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::TaskWaiting => write!(f, "task_waiting"),
            Self::Downloading => write!(f, "downloading"),
            Self::Extracting => write!(f, "extracting"),
            Self::Restoring => write!(f, "restoring"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::RestoreFailed => write!(f, "restore_failed"),
            Self::Error => write!(f, "error"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// A persisted request to restore one remote archive into one target entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreRequest {
    /// Assigned by the repository on first insert.
    pub id: Option<RequestId>,
    pub status: RequestStatus,
    pub target_entity_id: i64,
    pub remote_key: String,
    pub job_id: Option<String>,
    pub apply_run_id: Option<String>,
    pub progress: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl RestoreRequest {
    pub fn new(target_entity_id: i64, remote_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            status: RequestStatus::New,
            target_entity_id,
            remote_key: remote_key.into(),
            job_id: None,
            apply_run_id: None,
            progress: None,
            error_message: None,
            metadata: Metadata::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Moves to a non-failure status.
    ///
    /// Clears the error message, and clears progress unless the new status
    /// is `Restoring` or `Complete`.
    pub fn set_status(&mut self, status: RequestStatus) {
        self.status = status;
        if !status.is_failure() {
            self.error_message = None;
            self.metadata.remove(META_ERROR_DETAIL);
        }
        if !matches!(status, RequestStatus::Restoring | RequestStatus::Complete) {
            self.progress = None;
        }
    }

    /// Enters `Restoring` with progress reset to zero.
    pub fn begin_restoring(&mut self) {
        self.set_status(RequestStatus::Restoring);
        self.progress = Some(0.0);
    }

    pub fn complete(&mut self) {
        self.set_status(RequestStatus::Complete);
        self.progress = Some(1.0);
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.fail(RequestStatus::Failed, message.into());
    }

    pub fn mark_restore_failed(&mut self, message: impl Into<String>) {
        self.fail(RequestStatus::RestoreFailed, message.into());
    }

    fn fail(&mut self, status: RequestStatus, message: String) {
        self.status = status;
        self.progress = None;
        self.error_message = Some(message);
    }

    /// Compares the fields that matter for persistence.
    ///
    /// Progress and timestamps are ignored: progress is written through its
    /// own channel while the apply stage runs.
    pub fn differs_from(&self, other: &RestoreRequest) -> bool {
        self.status != other.status
            || self.target_entity_id != other.target_entity_id
            || self.remote_key != other.remote_key
            || self.job_id != other.job_id
            || self.apply_run_id != other.apply_run_id
            || self.error_message != other.error_message
            || self.metadata != other.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata_value(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn remove_metadata_value(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Trace detail captured with the last apply failure.
    pub fn error_detail(&self) -> Option<&str> {
        self.metadata.get(META_ERROR_DETAIL).and_then(Value::as_str)
    }

    pub fn set_error_detail(&mut self, detail: impl Into<String>) {
        self.metadata
            .insert(META_ERROR_DETAIL.to_string(), Value::String(detail.into()));
    }

    /// Settings the archive's plan locked and the rule set therefore left alone.
    pub fn skipped_settings(&self) -> Vec<String> {
        self.metadata
            .get(META_SKIPPED_SETTINGS)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_skipped_settings(&mut self, names: &[String]) {
        if names.is_empty() {
            self.metadata.remove(META_SKIPPED_SETTINGS);
            return;
        }
        let values = names.iter().cloned().map(Value::String).collect();
        self.metadata
            .insert(META_SKIPPED_SETTINGS.to_string(), Value::Array(values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip_known_values() {
        for code in 0..=8 {
            assert_eq!(RequestStatus::from_code(code).code(), code);
        }
        assert_eq!(RequestStatus::from_code(42), RequestStatus::Unknown(42));
    }

    #[test]
    fn test_active_statuses() {
        assert!(RequestStatus::New.is_active());
        assert!(RequestStatus::TaskWaiting.is_active());
        assert!(RequestStatus::Restoring.is_active());
        assert!(!RequestStatus::Complete.is_active());
        assert!(!RequestStatus::Failed.is_active());
        assert!(!RequestStatus::Unknown(-1).is_active());
        assert!(!RequestStatus::Unknown(99).is_active());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RequestStatus::Complete.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::RestoreFailed.is_terminal());
        assert!(RequestStatus::Error.is_terminal());
        assert!(!RequestStatus::Extracting.is_terminal());
    }

    #[test]
    fn test_new_request_defaults() {
        let request = RestoreRequest::new(7, "backups/course.mbz");
        assert_eq!(request.id, None);
        assert_eq!(request.status, RequestStatus::New);
        assert_eq!(request.target_entity_id, 7);
        assert_eq!(request.remote_key, "backups/course.mbz");
        assert!(request.progress.is_none());
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_begin_restoring_resets_progress() {
        let mut request = RestoreRequest::new(1, "k");
        request.progress = Some(0.7);
        request.begin_restoring();
        assert_eq!(request.status, RequestStatus::Restoring);
        assert_eq!(request.progress, Some(0.0));
    }

    #[test]
    fn test_failure_sets_message_and_clears_progress() {
        let mut request = RestoreRequest::new(1, "k");
        request.begin_restoring();
        request.progress = Some(0.4);
        request.mark_restore_failed("restore failed: boom");
        assert_eq!(request.status, RequestStatus::RestoreFailed);
        assert_eq!(request.error_message.as_deref(), Some("restore failed: boom"));
        assert!(request.progress.is_none());
    }

    #[test]
    fn test_non_failure_status_clears_error() {
        let mut request = RestoreRequest::new(1, "k");
        request.mark_failed("dispatch failed");
        request.set_error_detail("trace");
        request.set_status(RequestStatus::TaskWaiting);
        assert!(request.error_message.is_none());
        assert!(request.error_detail().is_none());
    }

    #[test]
    fn test_complete_keeps_full_progress() {
        let mut request = RestoreRequest::new(1, "k");
        request.begin_restoring();
        request.complete();
        assert_eq!(request.progress, Some(1.0));
    }

    #[test]
    fn test_differs_from_ignores_progress() {
        let original = RestoreRequest::new(1, "k");
        let mut copy = original.clone();
        copy.progress = Some(0.5);
        assert!(!copy.differs_from(&original));

        copy.job_id = Some("job".to_string());
        assert!(copy.differs_from(&original));
    }

    #[test]
    fn test_differs_from_sees_metadata() {
        let original = RestoreRequest::new(1, "k");
        let mut copy = original.clone();
        copy.set_metadata_value("origin", Value::String("api".into()));
        assert!(copy.differs_from(&original));
    }

    #[test]
    fn test_skipped_settings_accessors() {
        let mut request = RestoreRequest::new(1, "k");
        assert!(request.skipped_settings().is_empty());

        request.set_skipped_settings(&["users".to_string()]);
        assert_eq!(request.skipped_settings(), vec!["users".to_string()]);

        request.set_skipped_settings(&[]);
        assert!(request.metadata_value("skipped_settings").is_none());
    }
}
