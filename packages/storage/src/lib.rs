#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Image transfer to durable public storage.
//!
//! Moves one capture image from the archive into the storage provider:
//! stream-download into a scoped spool file, re-upload under a freshly
//! generated identifier via the provider's unsigned `multipart/form-data`
//! endpoint, and hand back the durable `secure_url`.
//!
//! The spool file is removed on every exit path — success, upload
//! failure, or mid-download error — via an RAII guard, so sustained load
//! cannot grow the local disk. Transfers for one request run
//! concurrently; each operates on an independent spool path and an
//! independent destination identifier, so no locking is needed between
//! them. There is no internal retry: a single failure at any step fails
//! the whole transfer.

use std::path::{Path, PathBuf};

use futures::StreamExt as _;
use landwatch_models::StoredImage;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;
use uuid::Uuid;

/// Errors from image transfer operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// Fetching the source image failed.
    #[error("Failed to download {url}: {source}")]
    Download {
        /// Source URL of the image.
        url: String,
        /// Underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Uploading to the storage provider failed.
    #[error("Failed to upload {name}: {source}")]
    Upload {
        /// Destination object name.
        name: String,
        /// Underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error on the local spool file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable storage configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider API root.
    pub base_url: String,
    /// Provider account (cloud) name, part of the upload endpoint path.
    pub cloud_name: String,
    /// Preset policy identifier for unsigned uploads.
    pub upload_preset: String,
    /// Local directory for in-flight spool files.
    pub spool_dir: PathBuf,
}

impl StorageConfig {
    /// Reads the storage configuration from environment variables.
    ///
    /// `STORAGE_CLOUD_NAME` and `STORAGE_UPLOAD_PRESET` are required;
    /// `STORAGE_BASE_URL` defaults to the Cloudinary API root and
    /// `SPOOL_DIR` to `public`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if a required variable is
    /// unset.
    pub fn from_env() -> Result<Self, StorageError> {
        Ok(Self {
            base_url: std::env::var("STORAGE_BASE_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com".to_string()),
            cloud_name: require_env("STORAGE_CLOUD_NAME")?,
            upload_preset: require_env("STORAGE_UPLOAD_PRESET")?,
            spool_dir: std::env::var("SPOOL_DIR")
                .unwrap_or_else(|_| "public".to_string())
                .into(),
        })
    }
}

/// Upload endpoint response; only the durable URL is of interest.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// A spool file that is removed when the guard goes out of scope.
///
/// Armed immediately after the spool path is chosen, so every exit path
/// from [`StorageClient::transfer`] — including `?` propagation out of
/// the upload step — releases the local copy.
struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("Failed to remove spool file {}: {e}", self.path.display());
        }
    }
}

/// Client for transferring images into durable public storage.
pub struct StorageClient {
    config: StorageConfig,
    client: reqwest::Client,
}

impl StorageClient {
    /// Creates a new storage client.
    #[must_use]
    pub const fn new(config: StorageConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// The configured spool directory.
    #[must_use]
    pub fn spool_dir(&self) -> &Path {
        &self.config.spool_dir
    }

    /// Transfers one image from `source_url` into durable storage.
    ///
    /// The destination name is a fresh UUID, never derived from the
    /// source filename, so concurrent transfers cannot collide.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Download`] when the source fetch fails or
    /// answers with a non-success status, [`StorageError::Upload`] when
    /// the provider rejects the upload, and [`StorageError::Io`] on
    /// spool file errors. In every case the spool file is gone by the
    /// time this returns.
    pub async fn transfer(&self, source_url: &str) -> Result<StoredImage, StorageError> {
        let name = format!("{}.jpg", Uuid::new_v4());

        let resp = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| download_error(source_url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StorageError::Download {
                url: source_url.to_string(),
                source: format!("HTTP {status}").into(),
            });
        }

        tokio::fs::create_dir_all(&self.config.spool_dir).await?;
        let spool = SpoolFile::new(self.config.spool_dir.join(&name));

        let mut file = tokio::fs::File::create(spool.path()).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(source_url, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let url = self.upload(&name, spool.path()).await?;
        log::info!("Transferred {source_url} -> {url}");

        Ok(StoredImage { url })
    }

    /// Uploads the spooled bytes under `name` and returns the durable URL.
    async fn upload(&self, name: &str, spool_path: &Path) -> Result<String, StorageError> {
        let data = tokio::fs::read(spool_path).await?;

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(name.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| upload_error(name, e))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone());

        let endpoint = format!(
            "{}/v1_1/{}/image/upload",
            self.config.base_url, self.config.cloud_name
        );

        let resp = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_error(name, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StorageError::Upload {
                name: name.to_string(),
                source: format!("HTTP {status}").into(),
            });
        }

        let body: UploadResponse = resp.json().await.map_err(|e| upload_error(name, e))?;
        Ok(body.secure_url)
    }
}

fn download_error(url: &str, source: reqwest::Error) -> StorageError {
    StorageError::Download {
        url: url.to_string(),
        source: Box::new(source),
    }
}

fn upload_error(name: &str, source: reqwest::Error) -> StorageError {
    StorageError::Upload {
        name: name.to_string(),
        source: Box::new(source),
    }
}

/// Reads a required environment variable.
fn require_env(name: &str) -> Result<String, StorageError> {
    std::env::var(name).map_err(|_| StorageError::MissingEnv {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_file_is_removed_on_drop() {
        let dir = std::env::temp_dir().join(format!("landwatch-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("image.jpg");
        std::fs::write(&path, b"bytes").unwrap();

        {
            let _spool = SpoolFile::new(path.clone());
        }

        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn spool_guard_tolerates_missing_file() {
        let path = std::env::temp_dir().join(format!("landwatch-never-created-{}", Uuid::new_v4()));
        let spool = SpoolFile::new(path.clone());
        drop(spool);
        assert!(!path.exists());
    }

    #[test]
    fn destination_names_are_unique_per_transfer() {
        let a = format!("{}.jpg", Uuid::new_v4());
        let b = format!("{}.jpg", Uuid::new_v4());
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
    }

    #[test]
    fn parses_upload_response_secure_url() {
        let body: UploadResponse = serde_json::from_str(
            r#"{"secure_url":"https://res.example/image/upload/abc.jpg","bytes":12345}"#,
        )
        .unwrap();
        assert_eq!(body.secure_url, "https://res.example/image/upload/abc.jpg");
    }
}
