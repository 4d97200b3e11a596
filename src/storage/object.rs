use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use super::ObjectStorage;
use crate::error::StorageError;

/// [`ObjectStorage`] over any `object_store` backend.
pub struct ObjectStoreUploader {
    inner: Arc<dyn ObjectStore>,
    public_base: Url,
    backend: &'static str,
}

impl ObjectStoreUploader {
    pub fn new(inner: Arc<dyn ObjectStore>, public_base: Url, backend: &'static str) -> Self {
        Self {
            inner,
            public_base,
            backend,
        }
    }

    /// S3 bucket. Credentials fall back to the ambient AWS environment when
    /// no explicit key pair is configured.
    pub fn s3(
        bucket: &str,
        region: &str,
        access_key_id: Option<&str>,
        secret_access_key: Option<&SecretString>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region);
        if let Some(id) = access_key_id {
            builder = builder.with_access_key_id(id);
        }
        if let Some(secret) = secret_access_key {
            builder = builder.with_secret_access_key(secret.expose_secret());
        }
        let store = builder.build().map_err(|e| misconfigured("aws", e))?;

        let base = parse_base("aws", &s3_public_base(bucket, region))?;
        Ok(Self::new(Arc::new(store), base, "aws"))
    }

    pub fn azure(
        account: &str,
        access_key: &SecretString,
        container: &str,
    ) -> Result<Self, StorageError> {
        let store = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_access_key(access_key.expose_secret())
            .with_container_name(container)
            .build()
            .map_err(|e| misconfigured("azure", e))?;

        let base = parse_base("azure", &azure_public_base(account, container))?;
        Ok(Self::new(Arc::new(store), base, "azure"))
    }

    /// Directory on the local filesystem, created if missing.
    pub fn local(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let root = path.canonicalize()?;
        let store = LocalFileSystem::new_with_prefix(&root).map_err(|e| misconfigured("local", e))?;

        let base = Url::from_directory_path(&root).map_err(|()| StorageError::Misconfigured {
            backend: "local".into(),
            reason: format!("{} is not an absolute path", root.display()),
        })?;
        Ok(Self::new(Arc::new(store), base, "local"))
    }

    /// Public location of an object stored at `location`.
    ///
    /// Built from the stored path's own parts, which `object_store` has
    /// already percent-encoded, so the URL names the object as stored.
    pub fn public_url(&self, location: &StorePath) -> String {
        let mut url = self.public_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(location.parts());
        }
        url.to_string()
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreUploader {
    async fn upload(&self, key: &str, bytes: Bytes) -> Result<String, StorageError> {
        let size = bytes.len();
        let location = StorePath::from(key);
        self.inner
            .put(&location, PutPayload::from(bytes))
            .await
            .map_err(|e| StorageError::UploadFailed {
                backend: self.backend.into(),
                key: key.into(),
                reason: e.to_string(),
            })?;

        let url = self.public_url(&location);
        info!(
            backend = self.backend,
            key,
            stored_as = %location,
            bytes = size,
            url = %url,
            "Archive uploaded"
        );
        Ok(url)
    }
}

fn s3_public_base(bucket: &str, region: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com/")
}

fn azure_public_base(account: &str, container: &str) -> String {
    format!("https://{account}.blob.core.windows.net/{container}")
}

fn parse_base(backend: &str, base: &str) -> Result<Url, StorageError> {
    Url::parse(base).map_err(|e| StorageError::Misconfigured {
        backend: backend.into(),
        reason: format!("{base}: {e}"),
    })
}

fn misconfigured(backend: &str, e: object_store::Error) -> StorageError {
    StorageError::Misconfigured {
        backend: backend.into(),
        reason: e.to_string(),
    }
}
