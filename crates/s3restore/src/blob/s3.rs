//! S3-compatible blob store.
//!
//! The SDK is async; the store owns a small tokio runtime and blocks on it,
//! so callers on worker threads keep a synchronous interface.

use std::path::{Path, PathBuf};

use aws_sdk_s3 as s3;
use aws_sdk_s3::error::DisplayErrorContext;
use s3::config::{BehaviorVersion, Credentials, Region};
use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;

use super::{BlobStore, BlobStoreError};
use crate::config::StorageConfig;
use crate::sanitize;
use crate::secrets::resolve_secret;

enum Endpoint {
    Ready {
        client: s3::Client,
        bucket: String,
        key_prefix: String,
    },
    Unconfigured(String),
}

pub struct S3BlobStore {
    runtime: Runtime,
    endpoint: Endpoint,
}

impl S3BlobStore {
    /// Builds the client from configuration.
    ///
    /// Incomplete configuration does not fail construction: the store is
    /// created unconfigured and every call reports `NotConfigured`.
    pub fn from_config(config: &StorageConfig) -> Result<Self, BlobStoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("s3restore-s3")
            .enable_all()
            .build()
            .map_err(|e| {
                BlobStoreError::Communication(format!("failed to start I/O runtime: {}", e))
            })?;

        let endpoint = match connect(&runtime, config) {
            Ok(endpoint) => endpoint,
            Err(reason) => {
                log::warn!("Remote storage unavailable: {}", reason);
                Endpoint::Unconfigured(reason)
            }
        };

        Ok(Self { runtime, endpoint })
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.endpoint, Endpoint::Ready { .. })
    }

    fn target(&self, key: &str) -> Result<(&s3::Client, &str, String), BlobStoreError> {
        match &self.endpoint {
            Endpoint::Ready {
                client,
                bucket,
                key_prefix,
            } => Ok((client, bucket.as_str(), object_key(key_prefix, key))),
            Endpoint::Unconfigured(reason) => Err(BlobStoreError::NotConfigured(reason.clone())),
        }
    }
}

fn connect(runtime: &Runtime, config: &StorageConfig) -> Result<Endpoint, String> {
    let bucket = config
        .bucket
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| "no bucket configured".to_string())?;
    let access_key_id = config
        .access_key_id
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "no access key id configured".to_string())?;
    let secret = resolve_secret(
        config.secret_access_key.as_deref(),
        config.secret_access_key_file.as_deref(),
        config.secret_access_key_env_var.as_deref(),
    )
    .map_err(|e| format!("secret access key: {}", e))?;

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            access_key_id,
            secret.expose_secret().to_string(),
            None,
            None,
            "Static",
        ));
    if let Some(url) = config.endpoint_url.as_deref().filter(|u| !u.is_empty()) {
        loader = loader.endpoint_url(url);
    }
    let sdk_config = runtime.block_on(loader.load());

    let s3_config = s3::config::Builder::from(&sdk_config)
        .force_path_style(config.force_path_style)
        .build();

    log::info!(
        "Remote storage configured for bucket '{}' in {}",
        bucket,
        config.region
    );

    Ok(Endpoint::Ready {
        client: s3::Client::from_conf(s3_config),
        bucket: bucket.to_string(),
        key_prefix: config.key_prefix.clone().unwrap_or_default(),
    })
}

fn object_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

impl BlobStore for S3BlobStore {
    fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let (client, bucket, object_key) = self.target(key)?;

        self.runtime.block_on(async {
            match client.head_object().bucket(bucket).key(&object_key).send().await {
                Ok(_) => Ok(true),
                Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                    Ok(false)
                }
                Err(err) => Err(BlobStoreError::Communication(
                    DisplayErrorContext(&err).to_string(),
                )),
            }
        })
    }

    fn fetch(&self, key: &str, dest_dir: &Path) -> Result<PathBuf, BlobStoreError> {
        let (client, bucket, object_key) = self.target(key)?;
        let dest = dest_dir.join(sanitize::file_name_for_key(key));
        let io_error = |e: std::io::Error| BlobStoreError::Io {
            path: dest.clone(),
            source: e,
        };

        self.runtime.block_on(async {
            let mut object = match client.get_object().bucket(bucket).key(&object_key).send().await
            {
                Ok(object) => object,
                Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                    return Err(BlobStoreError::NotFound {
                        key: key.to_string(),
                    });
                }
                Err(err) => {
                    return Err(BlobStoreError::Communication(
                        DisplayErrorContext(&err).to_string(),
                    ));
                }
            };

            let mut file = tokio::fs::File::create(&dest).await.map_err(io_error)?;
            let mut total_bytes = 0usize;
            while let Some(chunk) = object
                .body
                .try_next()
                .await
                .map_err(|e| BlobStoreError::Communication(e.to_string()))?
            {
                file.write_all(&chunk).await.map_err(io_error)?;
                total_bytes += chunk.len();
            }
            file.flush().await.map_err(io_error)?;

            log::info!(
                "Downloaded {} bytes from {} to {}",
                total_bytes,
                sanitize::redact_key(key),
                sanitize::redact_path(&dest)
            );
            Ok(dest.clone())
        })
    }
}
