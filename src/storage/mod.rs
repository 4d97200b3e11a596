//! Destination for decoder output archives.

mod object;

pub use object::ObjectStoreUploader;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Uploads finished archives and reports where they can be fetched.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`. Returns the object's public location.
    async fn upload(&self, key: &str, bytes: Bytes) -> Result<String, StorageError>;
}

/// Build the configured storage backend.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    let uploader = match config {
        StorageConfig::Aws {
            bucket,
            region,
            access_key_id,
            secret_access_key,
        } => ObjectStoreUploader::s3(
            bucket,
            region,
            access_key_id.as_deref(),
            secret_access_key.as_ref(),
        )?,
        StorageConfig::Azure {
            account,
            access_key,
            container,
        } => ObjectStoreUploader::azure(account, access_key, container)?,
        StorageConfig::Local { path } => ObjectStoreUploader::local(path)?,
    };
    Ok(Arc::new(uploader))
}
