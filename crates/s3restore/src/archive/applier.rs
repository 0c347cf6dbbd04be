//! Contract of the engine that applies an unpacked archive to a target.

use std::fmt;
use std::path::Path;

use crate::pipeline::ProgressReporter;

/// Failure reported by the apply engine.
///
/// The message is surfaced verbatim; the detail carries trace information
/// for operators.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyError {
    pub message: String,
    pub detail: Option<String>,
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApplyError {}

/// A boolean setting exposed by an apply plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSetting {
    pub name: String,
    pub value: bool,
    /// Locked settings are fixed by the archive and cannot be changed.
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecheckMessage {
    pub severity: PrecheckSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub items_restored: u64,
    pub warnings: Vec<String>,
}

/// Opens apply plans for unpacked archives.
pub trait ArchiveApplier: Send + Sync {
    /// Loads the archive in `source_dir` and prepares a plan that would
    /// restore it into `target_entity_id` on behalf of `actor_id`.
    fn prepare(
        &self,
        source_dir: &Path,
        target_entity_id: i64,
        actor_id: i64,
    ) -> Result<Box<dyn ApplyPlan>, ApplyError>;
}

/// A prepared restore that has not run yet.
pub trait ApplyPlan: Send {
    /// Identifier of this apply run, stable from preparation onwards.
    fn apply_run_id(&self) -> &str;

    fn settings(&self) -> Vec<PlanSetting>;

    fn set_setting(&mut self, name: &str, value: bool) -> Result<(), ApplyError>;

    /// Advisory checks; the caller decides what to do with them.
    fn precheck(&mut self) -> Vec<PrecheckMessage>;

    /// Runs the restore, reporting fractional progress as it goes.
    fn execute(&mut self, progress: &dyn ProgressReporter) -> Result<ApplySummary, ApplyError>;
}
