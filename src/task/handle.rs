use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::state::TaskState;
use crate::error::{AgentError, PackageError, StagingError};
use crate::staging::StagedArtifact;

/// Body of the decoder's `POST /status` callback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusCallback {
    /// Name the decoder now uses for the input file.
    #[serde(default)]
    pub filename: Option<String>,
    /// Free-form status; only the first token is interpreted.
    pub status: String,
    /// Channel the status refers to. Decoders send it as a string or a number.
    #[serde(default)]
    pub channel: Option<serde_json::Value>,
}

impl StatusCallback {
    /// First whitespace-separated token of the status.
    pub fn keyword(&self) -> Option<&str> {
        self.status.split_whitespace().next()
    }

    /// Channel for logging, `-` when absent.
    pub fn channel_label(&self) -> String {
        match &self.channel {
            None | Some(serde_json::Value::Null) => "-".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Body of the decoder's `POST /error` callback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorCallback {
    /// Failure code, forwarded to the controller verbatim.
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The in-flight task was handed back to the controller.
    Requested,
    NoTask,
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSnapshot {
    pub state: TaskState,
    pub task_id: Option<String>,
    pub busy: bool,
    pub polling: bool,
    pub current_filename: Option<String>,
}

/// Everything the task machine reacts to.
#[derive(Debug)]
pub enum TaskEvent {
    Poll,
    StagingFinished {
        attempt: u64,
        result: Result<StagedArtifact, StagingError>,
    },
    WatchdogExpired {
        attempt: u64,
    },
    DecoderStatus(StatusCallback),
    DecoderError(ErrorCallback),
    PackagingFinished {
        attempt: u64,
        result: Result<String, PackageError>,
    },
    /// Stop polling; `done` fires once no task is in flight.
    Stop {
        done: oneshot::Sender<()>,
    },
    Retry {
        reply: oneshot::Sender<RetryOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<MachineSnapshot>,
    },
}

/// Cloneable sender side of the task machine.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<TaskEvent>,
}

impl AgentHandle {
    pub(crate) fn new(tx: mpsc::Sender<TaskEvent>) -> Self {
        Self { tx }
    }

    /// Request a poll. Dropped silently if the queue is full, since a poll is
    /// already pending in that case.
    pub fn poll(&self) -> Result<(), AgentError> {
        match self.tx.try_send(TaskEvent::Poll) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AgentError::Stopped),
        }
    }

    pub async fn decoder_status(&self, callback: StatusCallback) -> Result<(), AgentError> {
        self.send(TaskEvent::DecoderStatus(callback)).await
    }

    pub async fn decoder_error(&self, callback: ErrorCallback) -> Result<(), AgentError> {
        self.send(TaskEvent::DecoderError(callback)).await
    }

    /// Disable polling and wait until the in-flight task, if any, terminates.
    pub async fn stop(&self) -> Result<(), AgentError> {
        let (done, rx) = oneshot::channel();
        self.send(TaskEvent::Stop { done }).await?;
        rx.await.map_err(|_| AgentError::Stopped)
    }

    /// Disable polling and abandon the in-flight task.
    pub async fn retry(&self) -> Result<RetryOutcome, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(TaskEvent::Retry { reply }).await?;
        rx.await.map_err(|_| AgentError::Stopped)
    }

    pub async fn snapshot(&self) -> Result<MachineSnapshot, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(TaskEvent::Snapshot { reply }).await?;
        rx.await.map_err(|_| AgentError::Stopped)
    }

    async fn send(&self, event: TaskEvent) -> Result<(), AgentError> {
        self.tx.send(event).await.map_err(|_| AgentError::Stopped)
    }
}

/// Deliver an event from a spawned job, if the machine is still running.
pub(crate) async fn deliver(events: &mpsc::WeakSender<TaskEvent>, event: TaskEvent) {
    if let Some(tx) = events.upgrade() {
        let _ = tx.send(event).await;
    }
}
