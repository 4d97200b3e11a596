//! Writes task input to disk and removes it afterwards.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::fetch::ByteStream;
use super::layout::WorkLayout;
use super::metadata::SessionDescriptor;
use crate::error::StagingError;
use crate::task::Task;

/// Owns the decoder's `input/`, `output/` and `details/` artifacts for a task.
#[derive(Debug, Clone)]
pub struct Stager {
    layout: WorkLayout,
}

impl Stager {
    pub fn new(layout: WorkLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    /// Stream the payload into `input/<filename>`. Returns bytes written.
    pub async fn write_audio(
        &self,
        filename: &str,
        mut stream: ByteStream,
    ) -> Result<u64, StagingError> {
        let path = self.layout.audio_path(filename);
        let write_err = |source| StagingError::Write {
            path: path.clone(),
            source,
        };

        let mut file = fs::File::create(&path).await.map_err(write_err)?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        info!(path = %path.display(), bytes = written, "Audio file saved");
        Ok(written)
    }

    /// Write `input/<stem>.txt` if the task requests channels or formats.
    pub async fn write_metadata(&self, task: &Task) -> Result<Option<PathBuf>, StagingError> {
        let Some(descriptor) = SessionDescriptor::for_task(task) else {
            info!(filename = %task.filename, "Metadata file not needed");
            return Ok(None);
        };

        let path = self.layout.metadata_path(&task.filename);
        let json = serde_json::to_vec(&descriptor)?;
        fs::write(&path, json)
            .await
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Metadata file saved");
        Ok(Some(path))
    }

    /// Remove the input audio, metadata, output and details artifacts derived
    /// from `filename`. Missing artifacts are logged. Returns what was removed.
    pub async fn cleanup(&self, filename: &str) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        for path in [
            self.layout.audio_path(filename),
            self.layout.metadata_path(filename),
        ] {
            if remove(&path, fs::remove_file(&path).await) {
                removed.push(path);
            }
        }

        for path in [
            self.layout.details_dir(filename),
            self.layout.output_dir(filename),
        ] {
            if remove(&path, fs::remove_dir_all(&path).await) {
                removed.push(path);
            }
        }

        removed
    }
}

fn remove(path: &Path, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!(path = %path.display(), "Removed");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove");
            false
        }
    }
}
