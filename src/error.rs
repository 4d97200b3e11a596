//! Error types for the decode agent.

use std::path::PathBuf;

use crate::task::FailureReason;

/// Errors raised while starting the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the task controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Controller returned {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Invalid response from controller: {0}")]
    InvalidResponse(String),

    #[error("Invalid controller URL: {0}")]
    InvalidUrl(String),
}

/// Errors retrieving a remote payload.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download request failed: {0}")]
    Request(String),

    #[error("Download returned status {0}")]
    Status(u16),

    #[error("Download response has no content length")]
    MissingContentLength,

    #[error("Download stream failed: {0}")]
    Stream(String),
}

/// Errors measuring local storage.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("Not enough disk space: need {required} bytes, {available} available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("Failed to query available space on {path}: {source}")]
    Query {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while staging a task's input on disk.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StagingError {
    /// The reason code reported to the controller for this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Fetch(_) => FailureReason::DownloadError,
            Self::Disk(DiskError::InsufficientSpace { .. }) => FailureReason::LocaldiskFull,
            Self::Disk(DiskError::Query { .. }) | Self::Write { .. } | Self::Metadata(_) => {
                FailureReason::StagingError
            }
        }
    }
}

/// Errors while bundling and uploading decoder output.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Output directory {path} not found: {source}")]
    OutputNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PackageError {
    /// The reason code reported to the controller for this error.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::OutputNotFound { .. } => FailureReason::TranscriptionsNotFound,
            Self::Archive(_) | Self::Storage(_) => FailureReason::UploadError,
        }
    }
}

/// Cloud storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend {backend} misconfigured: {reason}")]
    Misconfigured { backend: String, reason: String },

    #[error("Upload of {key} to {backend} failed: {reason}")]
    UploadFailed {
        backend: String,
        key: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors addressing the task state machine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Task state machine is not running")]
    Stopped,

    #[error("Task {task_id} in state {state} cannot transition to {target}")]
    InvalidTransition {
        task_id: String,
        state: String,
        target: String,
    },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_errors_map_to_reason_codes() {
        let full = StagingError::Disk(DiskError::InsufficientSpace {
            required: 10,
            available: 1,
        });
        assert_eq!(full.failure_reason(), FailureReason::LocaldiskFull);

        let download = StagingError::Fetch(FetchError::Status(404));
        assert_eq!(download.failure_reason(), FailureReason::DownloadError);

        let write = StagingError::Write {
            path: PathBuf::from("input/a.wav"),
            source: std::io::Error::other("boom"),
        };
        assert_eq!(write.failure_reason(), FailureReason::StagingError);
    }

    #[test]
    fn package_errors_map_to_reason_codes() {
        let missing = PackageError::OutputNotFound {
            path: PathBuf::from("output/call"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(missing.failure_reason(), FailureReason::TranscriptionsNotFound);

        let upload = PackageError::Storage(StorageError::UploadFailed {
            backend: "aws".into(),
            key: "call.zip".into(),
            reason: "denied".into(),
        });
        assert_eq!(upload.failure_reason(), FailureReason::UploadError);
    }
}
