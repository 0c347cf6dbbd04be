//! Archive handling: unpacking downloaded archives and the contract of the
//! engine that applies them to a target.

pub mod applier;
pub mod codec;
pub mod rules;

pub use applier::{
    ApplyError, ApplyPlan, ApplySummary, ArchiveApplier, PlanSetting, PrecheckMessage,
    PrecheckSeverity,
};
pub use codec::{unpack_archive, ArchiveError, ArchiveFormat, UnpackSummary};
pub use rules::{AppliedRules, ApplyRules};
