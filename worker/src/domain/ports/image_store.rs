//! Port for the object store holding captured screenshots.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by image store adapters.
    pub enum ImageStoreError {
        /// No object exists under the given key.
        NotFound { key: String } =>
            "capture image not found: {key}",
        /// The store could not be reached or read.
        Retrieval { message: String } =>
            "capture image retrieval failed: {message}",
    }
}

/// Port fetching screenshot bytes by their storage key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn fetch_image(&self, blob_key: &str) -> Result<Vec<u8>, ImageStoreError>;
}

/// Fixture implementation that has no objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureImageStore;

#[async_trait]
impl ImageStore for FixtureImageStore {
    async fn fetch_image(&self, blob_key: &str) -> Result<Vec<u8>, ImageStoreError> {
        Err(ImageStoreError::not_found(blob_key))
    }
}
