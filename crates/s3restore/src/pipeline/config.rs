use std::path::PathBuf;

use crate::archive::ApplyRules;
use crate::config::Config;
use crate::error::ConfigError;

pub struct PipelineConfig {
    pub scratch_root: PathBuf,
    pub manifest_file: String,
    pub rules: ApplyRules,
    pub progress_write_step: f64,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            scratch_root: config.resolved_scratch_directory(),
            manifest_file: config.restore.manifest_file.clone(),
            rules: ApplyRules::from_config(&config.restore)?,
            progress_write_step: config.restore.progress_write_step,
        })
    }
}
