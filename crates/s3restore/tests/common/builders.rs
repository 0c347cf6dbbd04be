//! Builders for archives, configurations and scripted apply engines.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use s3restore::archive::{
    ApplyError, ApplyPlan, ApplySummary, ArchiveApplier, PlanSetting, PrecheckMessage,
    PrecheckSeverity,
};
use s3restore::config::{Config, LoggingConfig, RestoreConfig, StorageConfig};
use s3restore::{MemoryCatalog, ProgressReporter};

/// Builder for backup archives written to disk.
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Archive containing just a manifest.
    pub fn with_manifest() -> Self {
        Self::new().file("manifest.xml", b"<manifest version=\"1\"/>")
    }

    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push((name.to_string(), content.to_vec()));
        self
    }

    pub fn write_tar_gz(&self, path: &Path) {
        let file = File::create(path).expect("Failed to create archive");
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in &self.entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_slice())
                .expect("Failed to append tar entry");
        }
        builder
            .into_inner()
            .expect("Failed to finish tar")
            .finish()
            .expect("Failed to finish gzip");
    }

    pub fn write_zip(&self, path: &Path) {
        let file = File::create(path).expect("Failed to create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in &self.entries {
            writer.start_file(name.as_str(), options).expect("Failed to start zip entry");
            writer.write_all(content).expect("Failed to write zip entry");
        }
        writer.finish().expect("Failed to finish zip");
    }
}

/// Builder for `Config` instances pointing at test directories.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                worker_count: 2,
                actor_id: 2,
                storage: StorageConfig::default(),
                restore: RestoreConfig::default(),
                logging: LoggingConfig::default(),
                ..Config::default()
            },
        }
    }

    pub fn scratch_directory(mut self, path: &Path) -> Self {
        self.config.scratch_directory = Some(path.to_string_lossy().to_string());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn manifest_file(mut self, name: &str) -> Self {
        self.config.restore.manifest_file = name.to_string();
        self
    }

    pub fn progress_write_step(mut self, step: f64) -> Self {
        self.config.restore.progress_write_step = step;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Settings and behaviour a `ScriptedApplier` plan reports.
#[derive(Clone, Default)]
pub struct ApplyScript {
    pub settings: Vec<PlanSetting>,
    pub fail_with: Option<ApplyError>,
    pub panic_with: Option<String>,
    pub progress_steps: Vec<f64>,
    pub creates_contingent: Vec<i64>,
    pub precheck: Vec<PrecheckMessage>,
}

impl ApplyScript {
    pub fn succeeding() -> Self {
        Self {
            progress_steps: vec![0.1, 0.35, 0.6, 0.85],
            ..Self::default()
        }
    }

    pub fn failing(message: &str, detail: &str) -> Self {
        Self {
            progress_steps: vec![0.2],
            fail_with: Some(ApplyError::with_detail(message, detail)),
            ..Self::default()
        }
    }

    pub fn panicking(message: &str) -> Self {
        Self {
            progress_steps: vec![0.3],
            panic_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn setting(mut self, name: &str, value: bool, locked: bool) -> Self {
        self.settings.push(PlanSetting {
            name: name.to_string(),
            value,
            locked,
        });
        self
    }

    pub fn creates_contingent(mut self, ids: &[i64]) -> Self {
        self.creates_contingent.extend_from_slice(ids);
        self
    }

    pub fn precheck_warning(mut self, message: &str) -> Self {
        self.precheck.push(PrecheckMessage {
            severity: PrecheckSeverity::Warning,
            message: message.to_string(),
        });
        self
    }
}

/// What the scripted engine observed during a run.
#[derive(Debug, Default, Clone)]
pub struct ApplyLog {
    pub prepared_for: Vec<(i64, i64)>,
    pub setting_writes: Vec<(String, bool)>,
    pub saw_manifest: bool,
}

/// Apply engine replaying an `ApplyScript` against a `MemoryCatalog`.
pub struct ScriptedApplier {
    script: ApplyScript,
    catalog: Arc<MemoryCatalog>,
    log: Arc<Mutex<ApplyLog>>,
}

impl ScriptedApplier {
    pub fn new(script: ApplyScript, catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            script,
            catalog,
            log: Arc::new(Mutex::new(ApplyLog::default())),
        }
    }

    pub fn log(&self) -> ApplyLog {
        self.log.lock().unwrap().clone()
    }
}

impl ArchiveApplier for ScriptedApplier {
    fn prepare(
        &self,
        source_dir: &Path,
        target_entity_id: i64,
        actor_id: i64,
    ) -> Result<Box<dyn ApplyPlan>, ApplyError> {
        {
            let mut log = self.log.lock().unwrap();
            log.prepared_for.push((target_entity_id, actor_id));
            log.saw_manifest = source_dir.join("manifest.xml").is_file();
        }
        Ok(Box::new(ScriptedPlan {
            target_entity_id,
            script: self.script.clone(),
            catalog: Arc::clone(&self.catalog),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedPlan {
    target_entity_id: i64,
    script: ApplyScript,
    catalog: Arc<MemoryCatalog>,
    log: Arc<Mutex<ApplyLog>>,
}

impl ApplyPlan for ScriptedPlan {
    fn apply_run_id(&self) -> &str {
        "scripted-run"
    }

    fn settings(&self) -> Vec<PlanSetting> {
        self.script.settings.clone()
    }

    fn set_setting(&mut self, name: &str, value: bool) -> Result<(), ApplyError> {
        self.log
            .lock()
            .unwrap()
            .setting_writes
            .push((name.to_string(), value));
        Ok(())
    }

    fn precheck(&mut self) -> Vec<PrecheckMessage> {
        self.script.precheck.clone()
    }

    fn execute(&mut self, progress: &dyn ProgressReporter) -> Result<ApplySummary, ApplyError> {
        for step in &self.script.progress_steps {
            progress.report(*step);
        }
        if let Some(message) = &self.script.panic_with {
            panic!("{}", message);
        }
        if let Some(err) = &self.script.fail_with {
            return Err(err.clone());
        }
        for id in &self.script.creates_contingent {
            self.catalog.add_contingent(self.target_entity_id, *id);
        }
        Ok(ApplySummary {
            items_restored: self.script.progress_steps.len() as u64,
            warnings: Vec::new(),
        })
    }
}
