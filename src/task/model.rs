//! Task and failure-reason types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Controller-assigned task identifier. Opaque; accepted as a JSON string or
/// number and always carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

/// One reserved unit of transcription work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub task_id: TaskId,
    /// Queue the controller reserved this task from.
    pub queue: String,
    /// Original file name; determines the extension and the archive name.
    pub filename: String,
    /// URL of the audio payload.
    pub source_location: String,
    pub channel_count: Option<u32>,
    pub output_formats: Option<Vec<String>>,
    /// Recording setup, e.g. `fartalk` or `boundary`.
    pub session_type: Option<String>,
}

/// Why a task failed. Reported to the controller as `err_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PollingTaskError,
    FileExtensionNotSupported,
    DownloadError,
    LocaldiskFull,
    DecoderDidNotStart,
    TranscriptionsNotFound,
    UploadError,
    StagingError,
    /// Code forwarded verbatim from the decoder's error callback.
    Decoder(String),
}

impl FailureReason {
    pub fn code(&self) -> &str {
        match self {
            Self::PollingTaskError => "POLLING_TASK_ERROR",
            Self::FileExtensionNotSupported => "FILE_EXTENSION_NOT_SUPPORTED",
            Self::DownloadError => "DOWNLOAD_ERROR",
            Self::LocaldiskFull => "LOCALDISK_FULL",
            Self::DecoderDidNotStart => "DECODER_DID_NOT_START",
            Self::TranscriptionsNotFound => "TRANSCRIPTIONS_NOT_FOUND",
            Self::UploadError => "UPLOAD_ERROR",
            Self::StagingError => "STAGING_ERROR",
            Self::Decoder(code) => code,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
