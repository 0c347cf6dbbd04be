use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::archive::{unpack_archive, ApplyError, ArchiveApplier, PrecheckSeverity};
use crate::blob::BlobStore;
use crate::context::ServiceContext;
use crate::db::request_repo;
use crate::error::ConfigError;
use crate::executor::JobHandler;
use crate::request::{RequestId, RequestStatus};
use crate::sanitize;
use crate::storage::ScratchDir;
use crate::target::TargetCatalog;

use super::config::PipelineConfig;
use super::context::JobContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{DbProgressReporter, ProgressReporter};

/// Drives one restore request from download to completion.
pub struct RestoreJobRunner {
    ctx: ServiceContext,
    config: PipelineConfig,
    blob_store: Arc<dyn BlobStore>,
    applier: Arc<dyn ArchiveApplier>,
    catalog: Arc<dyn TargetCatalog>,
}

impl RestoreJobRunner {
    pub fn new(
        ctx: ServiceContext,
        blob_store: Arc<dyn BlobStore>,
        applier: Arc<dyn ArchiveApplier>,
        catalog: Arc<dyn TargetCatalog>,
    ) -> Result<Self, ConfigError> {
        let config = PipelineConfig::from_config(&ctx.config)?;
        Ok(Self::with_pipeline_config(
            ctx, config, blob_store, applier, catalog,
        ))
    }

    pub fn with_pipeline_config(
        ctx: ServiceContext,
        config: PipelineConfig,
        blob_store: Arc<dyn BlobStore>,
        applier: Arc<dyn ArchiveApplier>,
        catalog: Arc<dyn TargetCatalog>,
    ) -> Self {
        Self {
            ctx,
            config,
            blob_store,
            applier,
            catalog,
        }
    }

    /// Runs the pipeline for one request. Failures end up on the request
    /// itself; nothing is returned.
    pub fn run(&self, request_id: RequestId) {
        let request = match request_repo::find_by_id(&self.ctx.db, request_id) {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(request_id, "Restore request not found, skipping job");
                return;
            }
            Err(e) => {
                error!(request_id, error = %e, "Failed to load restore request");
                return;
            }
        };

        let _job_span = info_span!("restore_job",
            request_id,
            target_entity_id = request.target_entity_id,
            key = %sanitize::redact_key(&request.remote_key),
        )
        .entered();

        if request.status.is_terminal() {
            warn!(status = %request.status, "Restore request already finished, skipping job");
            return;
        }

        info!("Starting restore");
        let mut job = JobContext::new(request_id, request);
        let result = self.execute(&mut job);

        for warning in &job.warnings {
            warn!(?warning, "Restore warning");
        }

        match result {
            Ok(()) => info!("Restore complete"),
            Err(e) => {
                error!(error = %e, "Restore failed");
                self.record_failure(request_id, &e);
            }
        }
        // Scratch directories go away with the context, after the outcome
        // has been recorded.
        drop(job);
    }

    fn execute(&self, job: &mut JobContext) -> Result<(), PipelineError> {
        let archive = {
            let _step = info_span!("download").entered();
            self.step_download(job)?
        };

        let work_dir = {
            let _step = info_span!("extract").entered();
            self.step_extract(job, &archive)?
        };

        {
            let _step = info_span!("validate_manifest").entered();
            self.step_validate_manifest(&work_dir)?;
        }

        {
            let _step = info_span!("apply").entered();
            self.step_apply(job, &work_dir)?;
        }

        {
            let _step = info_span!("remove_contingent").entered();
            self.step_remove_contingent(job);
        }

        let _step = info_span!("complete").entered();
        self.step_complete(job)
    }

    fn step_download(&self, job: &mut JobContext) -> Result<PathBuf, PipelineError> {
        job.request.set_status(RequestStatus::Downloading);
        request_repo::save_if_changed(&self.ctx.db, &mut job.request)?;

        let dir = ScratchDir::create(&self.config.scratch_root, "download")?;
        let archive = self
            .blob_store
            .fetch(&job.request.remote_key, dir.path())
            .map_err(PipelineError::Download)?;

        debug!(file = %sanitize::redact_path(&archive), "Archive downloaded");
        job.download_dir = Some(dir);
        Ok(archive)
    }

    fn step_extract(
        &self,
        job: &mut JobContext,
        archive: &Path,
    ) -> Result<PathBuf, PipelineError> {
        job.request.set_status(RequestStatus::Extracting);
        request_repo::save_if_changed(&self.ctx.db, &mut job.request)?;

        let work_dir = ScratchDir::create(&self.config.scratch_root, "restore")?;
        let work_path = work_dir.path().to_path_buf();
        job.work_dir = Some(work_dir);

        let summary = unpack_archive(archive, &work_path).map_err(PipelineError::Unpack)?;
        info!(
            files = summary.files,
            bytes = summary.bytes,
            format = ?summary.format,
            "Archive unpacked"
        );

        // The downloaded file is no longer needed once unpacked.
        if let Some(download_dir) = job.download_dir.take() {
            if let Err(e) = download_dir.release() {
                job.warnings.push(PipelineWarning::ScratchCleanupFailed {
                    error: e.to_string(),
                });
            }
        }

        Ok(work_path)
    }

    fn step_validate_manifest(&self, work_dir: &Path) -> Result<(), PipelineError> {
        if work_dir.join(&self.config.manifest_file).is_file() {
            Ok(())
        } else {
            Err(PipelineError::MissingManifest {
                manifest: self.config.manifest_file.clone(),
            })
        }
    }

    fn step_apply(&self, job: &mut JobContext, work_dir: &Path) -> Result<(), PipelineError> {
        let db = &self.ctx.db;
        let target = job.request.target_entity_id;

        // Progress is not part of the change check, so this write is forced.
        job.request.begin_restoring();
        request_repo::save(db, &mut job.request)?;

        let mut plan = guard_engine(|| self.applier.prepare(work_dir, target, self.ctx.actor_id))
            .map_err(PipelineError::Apply)?;
        job.request.apply_run_id = Some(plan.apply_run_id().to_string());

        let applied = guard_engine(|| self.config.rules.apply_to(plan.as_mut()))
            .map_err(PipelineError::Apply)?;
        debug!(
            excluded = applied.excluded.len(),
            overridden = applied.overridden.len(),
            skipped_locked = applied.skipped_locked.len(),
            "Setting rules applied"
        );
        job.request.set_skipped_settings(&applied.skipped_locked);
        request_repo::save_if_changed(db, &mut job.request)?;

        let precheck = guard_engine(|| Ok(plan.precheck())).map_err(PipelineError::Apply)?;
        for message in precheck {
            match message.severity {
                PrecheckSeverity::Info => info!(detail = %message.message, "Precheck"),
                PrecheckSeverity::Warning | PrecheckSeverity::Error => {
                    warn!(severity = ?message.severity, detail = %message.message, "Precheck");
                    job.warnings.push(PipelineWarning::Precheck {
                        message: message.message,
                    });
                }
            }
        }

        job.high_water_mark = match self.catalog.contingent_high_water_mark(target) {
            Ok(mark) => Some(mark),
            Err(e) => {
                job.warnings.push(PipelineWarning::ContingentLookupFailed {
                    error: e.to_string(),
                });
                None
            }
        };

        let reporter = DbProgressReporter::new(
            db.clone(),
            job.request_id,
            self.config.progress_write_step,
        );
        let summary = guard_engine(|| plan.execute(&reporter)).map_err(PipelineError::Apply)?;
        reporter.report(1.0);

        info!(items = summary.items_restored, "Apply finished");
        for warning in summary.warnings {
            warn!(warning = %warning, "Apply warning");
        }
        Ok(())
    }

    /// Deletes default sub-resources the apply created beyond the recorded
    /// high-water mark. Without a mark nothing is deleted. Individual
    /// failures are kept as warnings.
    fn step_remove_contingent(&self, job: &mut JobContext) {
        let target = job.request.target_entity_id;
        let mark = match job.high_water_mark {
            Some(Some(mark)) => mark,
            Some(None) => {
                debug!("No default sub-resource before restore, skipping cleanup");
                return;
            }
            None => return,
        };

        let created = match self.catalog.contingent_after(target, mark) {
            Ok(ids) => ids,
            Err(e) => {
                job.warnings.push(PipelineWarning::ContingentLookupFailed {
                    error: e.to_string(),
                });
                return;
            }
        };

        for resource_id in created {
            match self.catalog.delete_contingent(target, resource_id) {
                Ok(()) => debug!(resource_id, "Removed default sub-resource"),
                Err(e) => job.warnings.push(PipelineWarning::ContingentCleanupFailed {
                    resource_id,
                    error: e.to_string(),
                }),
            }
        }
    }

    fn step_complete(&self, job: &mut JobContext) -> Result<(), PipelineError> {
        // Reload so progress written during apply is not overwritten.
        let mut request = request_repo::find_by_id(&self.ctx.db, job.request_id)?
            .ok_or(PipelineError::RequestMissing(job.request_id))?;
        request.complete();
        request_repo::save_if_changed(&self.ctx.db, &mut request)?;
        job.request = request;
        Ok(())
    }

    fn record_failure(&self, request_id: RequestId, failure: &PipelineError) {
        let mut request = match request_repo::find_by_id(&self.ctx.db, request_id) {
            Ok(Some(request)) => request,
            Ok(None) => {
                error!(request_id, "Restore request vanished before failure could be recorded");
                return;
            }
            Err(e) => {
                error!(request_id, error = %e, "Failed to reload restore request");
                return;
            }
        };

        let message = failure.to_string();
        if request.status == RequestStatus::Restoring {
            request.mark_restore_failed(message);
        } else {
            request.mark_failed(message);
        }
        if let Some(detail) = failure.detail() {
            request.set_error_detail(detail);
        }

        if let Err(e) = request_repo::save_if_changed(&self.ctx.db, &mut request) {
            error!(request_id, error = %e, "Failed to record restore failure");
        }
    }
}

/// Runs a call into the apply engine, reporting a panic as an `ApplyError`
/// so the request still ends in a failure status.
fn guard_engine<T>(call: impl FnOnce() -> Result<T, ApplyError>) -> Result<T, ApplyError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(ApplyError::new(format!(
            "apply engine panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl JobHandler for RestoreJobRunner {
    fn run(&self, request_id: RequestId) {
        RestoreJobRunner::run(self, request_id);
    }
}
