//! Staging: getting a task's input onto local disk for the decoder.
//!
//! Order per task:
//! 1. `fetch` opens the download and learns its length
//! 2. `disk` checks the length plus margin fits (nothing written yet)
//! 3. `stager` writes the metadata descriptor, then streams the audio
//! 4. `duration` probes the written file in the background for the logs

pub mod disk;
pub mod duration;
pub mod fetch;
pub mod layout;
pub mod metadata;
pub mod stager;

pub use disk::{DISK_SAFETY_MARGIN_BYTES, DiskGuard, FsDiskGuard};
pub use fetch::{ByteStream, FetchedPayload, Fetcher, HttpFetcher};
pub use layout::WorkLayout;
pub use metadata::SessionDescriptor;
pub use stager::Stager;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::StagingError;
use crate::task::Task;

/// Files written for a staged task.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedArtifact {
    pub audio_path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub bytes_written: u64,
}

/// Fetcher, disk guard and stager wired together.
#[derive(Clone)]
pub struct StagingPipeline {
    fetcher: Arc<dyn Fetcher>,
    disk: Arc<dyn DiskGuard>,
    stager: Stager,
}

impl StagingPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, disk: Arc<dyn DiskGuard>, stager: Stager) -> Self {
        Self {
            fetcher,
            disk,
            stager,
        }
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    /// Download and write `task`'s input. The disk check runs before the
    /// first write, so a rejected task leaves nothing behind.
    pub async fn stage(&self, task: &Task) -> Result<StagedArtifact, StagingError> {
        let payload = self.fetcher.fetch(&task.source_location).await?;
        info!(
            task_id = %task.task_id,
            content_length = payload.content_length,
            "Download started"
        );

        self.disk.check(payload.content_length).await?;

        let metadata_path = self.stager.write_metadata(task).await?;
        let bytes_written = self
            .stager
            .write_audio(&task.filename, payload.stream)
            .await?;

        let audio_path = self.stager.layout().audio_path(&task.filename);
        duration::spawn_duration_probe(audio_path.clone());

        Ok(StagedArtifact {
            audio_path,
            metadata_path,
            bytes_written,
        })
    }
}
