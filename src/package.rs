//! Bundles the decoder's output directory into a zip and uploads it.

use std::io::{Cursor, Write};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;

use crate::error::PackageError;
use crate::staging::WorkLayout;
use crate::staging::layout::file_stem;
use crate::storage::ObjectStorage;

/// Object key for the archive of `filename`: `call.wav` -> `call.zip`.
pub fn archive_name(filename: &str) -> String {
    format!("{}.zip", file_stem(filename))
}

pub struct Packager {
    layout: WorkLayout,
    storage: Arc<dyn ObjectStorage>,
}

impl Packager {
    pub fn new(layout: WorkLayout, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { layout, storage }
    }

    /// Zip `output/<stem of current_filename>/` and upload it as
    /// `<stem of original_filename>.zip`. Returns the uploaded location.
    pub async fn package_and_upload(
        &self,
        current_filename: &str,
        original_filename: &str,
    ) -> Result<String, PackageError> {
        let dir = self.layout.output_dir(current_filename);
        let files = collect_files(&dir).await?;
        info!(dir = %dir.display(), files = files.len(), "Packaging decoder output");

        let archive = tokio::task::spawn_blocking(move || build_archive(&files))
            .await
            .map_err(|e| PackageError::Archive(e.to_string()))??;

        let key = archive_name(original_filename);
        let location = self.storage.upload(&key, Bytes::from(archive)).await?;
        Ok(location)
    }
}

/// Regular files directly inside `dir`, sorted by name.
async fn collect_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, PackageError> {
    let not_found = |source| PackageError::OutputNotFound {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir).await.map_err(not_found)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(not_found)? {
        let file_type = entry.file_type().await.map_err(not_found)?;
        let path = entry.path();
        if !file_type.is_file() {
            warn!(path = %path.display(), "Skipping non-file entry in output");
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(path = %path.display(), "Skipping output file with non UTF-8 name");
            continue;
        };
        files.push((name, path));
    }
    files.sort();
    Ok(files)
}

fn build_archive(files: &[(String, PathBuf)]) -> Result<Vec<u8>, PackageError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, path) in files {
        let contents = std::fs::read(path).map_err(archive_err)?;
        writer
            .start_file(name.as_str(), options)
            .map_err(archive_err)?;
        writer.write_all(&contents).map_err(archive_err)?;
    }

    let cursor = writer.finish().map_err(archive_err)?;
    Ok(cursor.into_inner())
}

fn archive_err(e: impl Display) -> PackageError {
    PackageError::Archive(e.to_string())
}
