//! Filesystem-backed capture image store.
//!
//! Deployments mount the capture bucket (or a sync of it) under a local
//! root; keys map directly onto relative paths. Remote object stores
//! implement the same port behind their own adapter.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::domain::ports::{ImageStore, ImageStoreError};

/// Image store reading screenshot bytes from a local directory tree.
#[derive(Debug, Clone)]
pub struct FilesystemImageStore {
    root: PathBuf,
}

impl FilesystemImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage key beneath the root, rejecting path traversal.
    fn resolve(&self, blob_key: &str) -> Result<PathBuf, ImageStoreError> {
        let relative = Path::new(blob_key.trim_start_matches('/'));
        let traverses = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if blob_key.trim().is_empty() || traverses {
            return Err(ImageStoreError::retrieval(format!(
                "invalid storage key: {blob_key:?}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn fetch_image(&self, blob_key: &str) -> Result<Vec<u8>, ImageStoreError> {
        let path = self.resolve(blob_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageStoreError::not_found(blob_key))
            }
            Err(err) => Err(ImageStoreError::retrieval(format!(
                "reading {}: {err}",
                path.display()
            ))),
        }
    }
}
