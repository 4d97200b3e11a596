//! Task lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::Task;
use crate::error::AgentError;

/// State of the worker's task pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// No task; polling may reserve one.
    Idle,
    /// Task reserved, extension not yet checked.
    Reserved,
    /// Downloading the payload and writing input files.
    Staging,
    /// Input staged; the start watchdog is armed.
    AwaitingDecoderStart,
    /// Decoder reported `STARTING`.
    Decoding,
    /// Decoder reported `DONE`; archive is being built and uploaded.
    Packaging,
    Succeeded,
    Failed,
    /// Abandoned by an explicit retry request.
    Retried,
}

impl TaskState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;

        if target == Failed || target == Retried {
            return !self.is_terminal() && *self != Idle;
        }

        matches!(
            (self, target),
            (Idle, Reserved)
                | (Reserved, Staging)
                | (Staging, AwaitingDecoderStart)
                | (AwaitingDecoderStart, Decoding)
                | (AwaitingDecoderStart, Packaging)
                | (Decoding, Packaging)
                | (Packaging, Succeeded)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Retried)
    }

    /// Whether a status callback may still rename the input. Once the
    /// decoder has reported `DONE` the name being packaged is fixed.
    pub fn accepts_rename(&self) -> bool {
        matches!(
            self,
            Self::Staging | Self::AwaitingDecoderStart | Self::Decoding
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Reserved => "reserved",
            Self::Staging => "staging",
            Self::AwaitingDecoderStart => "awaiting_decoder_start",
            Self::Decoding => "decoding",
            Self::Packaging => "packaging",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Retried => "retried",
        };
        write!(f, "{s}")
    }
}

/// Decoder keyword that arrived while the input was still being staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlySignal {
    Started,
    Done,
}

/// The task currently occupying the pipeline.
#[derive(Debug, Clone)]
pub struct ActiveTask {
    pub task: Task,
    /// Process-unique admission counter; stale async results carry an older one.
    pub attempt: u64,
    pub state: TaskState,
    /// Name the decoder currently uses for the input. Starts as the reserved
    /// filename and follows renames reported through status callbacks.
    pub current_filename: String,
    /// Replayed once staging completes.
    pub early_signal: Option<EarlySignal>,
    pub reserved_at: DateTime<Utc>,
}

impl ActiveTask {
    /// Admit a freshly reserved task.
    pub fn reserve(task: Task, attempt: u64) -> Self {
        let current_filename = task.filename.clone();
        Self {
            task,
            attempt,
            state: TaskState::Reserved,
            current_filename,
            early_signal: None,
            reserved_at: Utc::now(),
        }
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, target: TaskState) -> Result<(), AgentError> {
        if !self.state.can_transition_to(target) {
            return Err(AgentError::InvalidTransition {
                task_id: self.task.task_id.to_string(),
                state: self.state.to_string(),
                target: target.to_string(),
            });
        }

        tracing::debug!(
            task_id = %self.task.task_id,
            from = %self.state,
            to = %target,
            "Task state transition"
        );
        self.state = target;
        Ok(())
    }

    /// Seconds since the task was reserved.
    pub fn elapsed_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.reserved_at)
            .num_seconds()
            .max(0)
    }
}
