//! Free-space preflight before writing a payload.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DiskError;

/// Headroom required on top of the payload for metadata and filesystem
/// overhead.
pub const DISK_SAFETY_MARGIN_BYTES: u64 = 100_000;

/// Reports available local storage.
#[async_trait]
pub trait DiskGuard: Send + Sync {
    async fn available_bytes(&self) -> Result<u64, DiskError>;

    /// Returns the available bytes if `expected_bytes` plus the safety margin
    /// fits, otherwise [`DiskError::InsufficientSpace`].
    async fn check(&self, expected_bytes: u64) -> Result<u64, DiskError> {
        let available = self.available_bytes().await?;
        let required = expected_bytes.saturating_add(DISK_SAFETY_MARGIN_BYTES);
        debug!(available, required, "Local disk space checked");

        if available < required {
            return Err(DiskError::InsufficientSpace {
                required,
                available,
            });
        }
        Ok(available)
    }
}

/// Measures the filesystem holding `path`.
pub struct FsDiskGuard {
    path: PathBuf,
}

impl FsDiskGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiskGuard for FsDiskGuard {
    async fn available_bytes(&self) -> Result<u64, DiskError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            fs2::available_space(&path).map_err(|source| DiskError::Query { path, source })
        })
        .await
        .map_err(|e| DiskError::Query {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?
    }
}
