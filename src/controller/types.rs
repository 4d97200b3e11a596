//! Controller wire format.

use serde::{Deserialize, Serialize};

use crate::task::{FailureReason, Task, TaskId};

/// Body of `POST /tasks/actions` asking for a task.
#[derive(Debug, Serialize)]
pub struct ReserveRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub worker: &'a str,
    pub lang: &'a str,
    pub queue: &'a str,
    pub sampling: &'a str,
}

/// Response to a reservation; `task` is null when nothing is pending.
#[derive(Debug, Deserialize)]
pub struct ReserveResponse {
    #[serde(default)]
    pub task: Option<TaskEnvelope>,
}

#[derive(Debug, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    #[serde(default)]
    pub queue: Option<String>,
    pub data: TaskData,
}

#[derive(Debug, Deserialize)]
pub struct TaskData {
    pub filename: String,
    #[serde(rename = "cloud-link")]
    pub cloud_link: String,
    #[serde(default)]
    pub formats: Option<Vec<String>>,
    #[serde(default, rename = "numChn")]
    pub num_chn: Option<u32>,
    #[serde(default, rename = "type")]
    pub session_type: Option<String>,
}

impl TaskEnvelope {
    /// Convert into a [`Task`] if it was reserved from `queue`.
    pub fn into_task_for_queue(self, queue: &str) -> Option<Task> {
        let task_queue = self.queue?;
        if task_queue != queue {
            return None;
        }

        Some(Task {
            task_id: self.task_id,
            queue: task_queue,
            filename: self.data.filename,
            source_location: self.data.cloud_link,
            channel_count: self.data.num_chn,
            output_formats: self.data.formats,
            session_type: self.data.session_type,
        })
    }
}

/// Body of `POST /tasks/{task_id}/actions`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskAction<'a> {
    Progress {
        worker: &'a str,
        progress: &'a str,
    },
    Success {
        worker: &'a str,
        result: SuccessResult<'a>,
    },
    Error {
        worker: &'a str,
        err_code: &'a FailureReason,
    },
    Retry {
        worker: &'a str,
    },
}

impl TaskAction<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Retry { .. } => "retry",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResult<'a> {
    #[serde(rename = "cloud-link")]
    pub cloud_link: &'a str,
}
