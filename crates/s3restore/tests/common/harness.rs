//! Test harness for isolated restore runs.
//!
//! `TestHarness` owns temporary blob and scratch directories, an in-memory
//! database and a `MemoryCatalog`, and wires the submission guard, job
//! runner and API around them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use s3restore::blob::BlobStoreError;
use s3restore::db::{request_repo, Database};
use s3restore::executor::DispatchError;
use s3restore::{
    BlobStore, Config, JobExecutor, JobId, JobPayload, LocalBlobStore, MemoryCatalog, RequestId,
    RestoreApi, RestoreJobRunner, RestoreRequest, ServiceContext, StatusProjector,
    SubmissionGuard, TargetCatalog,
};

use super::builders::{ApplyScript, ArchiveBuilder, ConfigBuilder, ScriptedApplier};

/// Executor that only records jobs; tests run them by hand.
#[derive(Default)]
pub struct ManualExecutor {
    queued: Mutex<Vec<(JobId, JobPayload)>>,
    refuse: Mutex<bool>,
}

impl ManualExecutor {
    pub fn refuse_jobs(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    /// Removes and returns every queued request id.
    pub fn drain(&self) -> Vec<RequestId> {
        self.queued
            .lock()
            .unwrap()
            .drain(..)
            .map(|(_, payload)| payload.request_id)
            .collect()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.lock().unwrap().len()
    }
}

impl JobExecutor for ManualExecutor {
    fn enqueue(&self, payload: JobPayload) -> Result<JobId, DispatchError> {
        if *self.refuse.lock().unwrap() {
            return Err(DispatchError::ShutDown);
        }
        let mut queued = self.queued.lock().unwrap();
        let id = format!("manual-{}-{}", payload.request_id, queued.len());
        queued.push((id.clone(), payload));
        Ok(id)
    }
}

/// Blob store whose every call fails as a transport error.
pub struct UnreachableBlobStore;

impl BlobStore for UnreachableBlobStore {
    fn exists(&self, _key: &str) -> Result<bool, BlobStoreError> {
        Err(BlobStoreError::Communication("endpoint unreachable".to_string()))
    }

    fn fetch(&self, _key: &str, _dest_dir: &Path) -> Result<PathBuf, BlobStoreError> {
        Err(BlobStoreError::Communication("endpoint unreachable".to_string()))
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub blob_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub db: Database,
    pub catalog: Arc<MemoryCatalog>,
    pub ctx: ServiceContext,
}

impl TestHarness {
    /// Harness with targets 1 to 5 registered.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blob_dir = temp_dir.path().join("blobs");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&blob_dir).expect("Failed to create blob dir");

        let config = ConfigBuilder::new().scratch_directory(&scratch_dir).build();
        Self::with_config(temp_dir, blob_dir, scratch_dir, config)
    }

    fn with_config(
        temp_dir: TempDir,
        blob_dir: PathBuf,
        scratch_dir: PathBuf,
        config: Config,
    ) -> Self {
        let db = Database::open_in_memory().expect("Failed to open database");
        let ctx = ServiceContext::new(Arc::new(config), db.clone());
        let catalog = Arc::new(MemoryCatalog::with_targets(1..=5));

        Self {
            temp_dir,
            blob_dir,
            scratch_dir,
            db,
            catalog,
            ctx,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn local_store(&self) -> Arc<dyn BlobStore> {
        Arc::new(LocalBlobStore::new(&self.blob_dir))
    }

    pub fn put_archive(&self, key: &str, archive: ArchiveBuilder) {
        let path = self.blob_dir.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to create blob dir");
        archive.write_tar_gz(&path);
    }

    pub fn put_raw(&self, key: &str, content: &[u8]) {
        let path = self.blob_dir.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).expect("Failed to create blob dir");
        std::fs::write(path, content).expect("Failed to write blob");
    }

    pub fn guard(
        &self,
        blob_store: Arc<dyn BlobStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> SubmissionGuard {
        SubmissionGuard::new(
            self.ctx.clone(),
            blob_store,
            Arc::clone(&self.catalog) as Arc<dyn TargetCatalog>,
            executor,
        )
    }

    pub fn api(&self, executor: Arc<dyn JobExecutor>) -> RestoreApi {
        RestoreApi::new(
            self.guard(self.local_store(), executor),
            StatusProjector::new(self.db.clone()),
        )
    }

    pub fn applier(&self, script: ApplyScript) -> Arc<ScriptedApplier> {
        Arc::new(ScriptedApplier::new(script, Arc::clone(&self.catalog)))
    }

    pub fn runner(
        &self,
        blob_store: Arc<dyn BlobStore>,
        applier: Arc<ScriptedApplier>,
    ) -> RestoreJobRunner {
        RestoreJobRunner::new(
            self.ctx.clone(),
            blob_store,
            applier,
            Arc::clone(&self.catalog) as Arc<dyn TargetCatalog>,
        )
        .expect("Failed to build runner")
    }

    pub fn load(&self, id: RequestId) -> RestoreRequest {
        request_repo::find_by_id(&self.db, id)
            .expect("Failed to query request")
            .expect("Request not found")
    }

    pub fn total_requests(&self) -> u64 {
        request_repo::query(&self.db, &Default::default())
            .expect("Failed to query requests")
            .1
    }

    /// True when no scratch or working directory is left behind.
    pub fn scratch_is_clean(&self) -> bool {
        match std::fs::read_dir(&self.scratch_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}
