use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

/// File extensions accepted for turf photos.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unsupported image type {0:?} (expected one of jpg, jpeg, png, webp, gif)")]
    UnsupportedType(String),
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
}

/// Turf photos on the local filesystem, served back under `public_prefix`.
///
/// Objects are keyed `<turf_id>/<epoch millis>_<random>_<index>.<ext>` and are
/// never overwritten.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_prefix: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a fresh key for the `index`-th file of one upload. The extension
    /// is taken from the client's file name.
    pub fn object_key(turf_id: i64, index: usize, file_name: &str) -> Result<String, KeyError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(KeyError::UnsupportedType(file_name.to_string()));
        }
        Ok(format!(
            "{turf_id}/{}_{}_{index}.{ext}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_prefix)
    }

    /// Inverse of [`public_url`](Self::public_url).
    pub fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.public_prefix.as_str())?.strip_prefix('/')
    }

    /// Writes `bytes` under a new `key` and returns the public URL. Fails if
    /// the key is already taken.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(self.public_url(key))
    }

    /// Removes the object behind a public URL. Returns false if the URL is
    /// not one of ours or the file is already gone.
    pub async fn delete_url(&self, url: &str) -> Result<bool> {
        let Some(key) = self.key_from_url(url) else {
            debug!("{url} is not a stored object, nothing to delete");
            return Ok(false);
        };
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KeyError> {
        let valid = !key.is_empty()
            && key.split('/').all(|part| {
                !part.is_empty()
                    && part != "."
                    && part != ".."
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            });
        if !valid {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}
