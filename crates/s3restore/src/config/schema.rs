use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub scratch_directory: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// User recorded as performing restores.
    #[serde(default)]
    pub actor_id: i64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub restore: RestoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Config {
    /// Configured database path, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> PathBuf {
        match self.database_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => crate::db::default_database_path()
                .unwrap_or_else(|| PathBuf::from("s3restore.db")),
        }
    }

    /// Root under which per-job scratch directories are created.
    pub fn resolved_scratch_directory(&self) -> PathBuf {
        match self.scratch_directory.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => std::env::temp_dir().join("s3restore"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            scratch_directory: None,
            worker_count: default_worker_count(),
            actor_id: 0,
            storage: StorageConfig::default(),
            restore: RestoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub secret_access_key_file: Option<String>,
    #[serde(default)]
    pub secret_access_key_env_var: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            secret_access_key_file: None,
            secret_access_key_env_var: None,
            key_prefix: None,
            force_path_style: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// File that must exist at the root of an unpacked archive.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Regexes naming plan settings that are always switched off.
    #[serde(default = "default_excluded_settings")]
    pub excluded_settings: Vec<String>,
    #[serde(default = "default_setting_overrides")]
    pub setting_overrides: BTreeMap<String, bool>,
    /// Smallest progress change worth writing to the database.
    #[serde(default = "default_progress_write_step")]
    pub progress_write_step: f64,
}

fn default_manifest_file() -> String {
    "manifest.xml".to_string()
}

fn default_excluded_settings() -> Vec<String> {
    vec![r"^lti_[0-9]*_(?:included|userinfo)$".to_string()]
}

fn default_setting_overrides() -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("overwrite_conf".to_string(), false),
        ("users".to_string(), false),
        ("keep_roles_and_enrolments".to_string(), true),
        ("keep_groups_and_groupings".to_string(), true),
    ])
}

fn default_progress_write_step() -> f64 {
    0.01
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            manifest_file: default_manifest_file(),
            excluded_settings: default_excluded_settings(),
            setting_overrides: default_setting_overrides(),
            progress_write_step: default_progress_write_step(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}
