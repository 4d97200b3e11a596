//! Local directory layout shared with the decoder.
//!
//! ```text
//! <root>/input/<name>          audio payload
//! <root>/input/<stem>.txt      session metadata
//! <root>/output/<stem>/        decoder results
//! <root>/details/<stem>/       decoder side artifacts
//! ```

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::SUPPORTED_EXTENSIONS;

pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";
pub const DETAILS_DIR: &str = "details";

/// Resolves task file names to paths under the work directory.
#[derive(Debug, Clone)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `input/`, `output/` and `details/` if missing.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [INPUT_DIR, OUTPUT_DIR, DETAILS_DIR] {
            fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    pub fn audio_path(&self, filename: &str) -> PathBuf {
        self.root.join(INPUT_DIR).join(base_name(filename))
    }

    pub fn metadata_path(&self, filename: &str) -> PathBuf {
        self.root
            .join(INPUT_DIR)
            .join(format!("{}.txt", file_stem(filename)))
    }

    pub fn output_dir(&self, filename: &str) -> PathBuf {
        self.root.join(OUTPUT_DIR).join(file_stem(filename))
    }

    pub fn details_dir(&self, filename: &str) -> PathBuf {
        self.root.join(DETAILS_DIR).join(file_stem(filename))
    }
}

/// Final path component of `filename`, so names cannot escape the layout.
pub fn base_name(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}

/// File name without its last extension: `call.final.wav` -> `call.final`.
pub fn file_stem(filename: &str) -> &str {
    Path::new(base_name(filename))
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
}

/// Extension without the dot, if any.
pub fn file_extension(filename: &str) -> Option<&str> {
    Path::new(base_name(filename))
        .extension()
        .and_then(|e| e.to_str())
}

/// Whether the decoder accepts this file type. Matching is case-sensitive.
pub fn is_supported(filename: &str) -> bool {
    file_extension(filename).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derived_from_name() {
        let layout = WorkLayout::new("/work");
        assert_eq!(layout.audio_path("call.wav"), PathBuf::from("/work/input/call.wav"));
        assert_eq!(
            layout.metadata_path("call.wav"),
            PathBuf::from("/work/input/call.txt")
        );
        assert_eq!(layout.output_dir("call.wav"), PathBuf::from("/work/output/call"));
        assert_eq!(layout.details_dir("call.wav"), PathBuf::from("/work/details/call"));
    }

    #[test]
    fn names_cannot_escape_root() {
        let layout = WorkLayout::new("/work");
        assert_eq!(
            layout.audio_path("../../etc/passwd.wav"),
            PathBuf::from("/work/input/passwd.wav")
        );
        assert_eq!(layout.output_dir("a/b/c.mp3"), PathBuf::from("/work/output/c"));
    }

    #[test]
    fn stem_and_extension() {
        assert_eq!(file_stem("call.final.wav"), "call.final");
        assert_eq!(file_extension("call.final.wav"), Some("wav"));
        assert_eq!(file_extension("noext"), None);
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported("call.wav"));
        assert!(is_supported("stream.ts"));
        assert!(!is_supported("call.xyz"));
        assert!(!is_supported("call"));
        assert!(!is_supported("CALL.WAV"));
    }

    #[tokio::test]
    async fn ensure_dirs_creates_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkLayout::new(tmp.path());
        layout.ensure_dirs().await.unwrap();
        for dir in [INPUT_DIR, OUTPUT_DIR, DETAILS_DIR] {
            assert!(tmp.path().join(dir).is_dir());
        }
    }
}
