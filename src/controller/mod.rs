//! Task controller integration.
//!
//! The controller owns the work queue. The worker reserves one task at a time
//! and reports progress and terminal status for it.

mod client;
pub mod types;

pub use client::HttpController;

use async_trait::async_trait;

use crate::error::ControllerError;
use crate::task::{FailureReason, Task, TaskId};

/// Outbound calls to the task controller.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Ask for a pending task. Tasks reserved from another queue come back as
    /// `None`.
    async fn reserve(&self) -> Result<Option<Task>, ControllerError>;

    /// Forward a decoder progress string verbatim.
    async fn report_progress(&self, task_id: &TaskId, status: &str)
    -> Result<(), ControllerError>;

    /// Report successful completion with the uploaded archive's location.
    async fn report_success(&self, task_id: &TaskId, location: &str)
    -> Result<(), ControllerError>;

    /// Report a failure. `task_id` is `None` when no task was reserved, as for
    /// `POLLING_TASK_ERROR`.
    async fn report_failure(
        &self,
        task_id: Option<&TaskId>,
        reason: &FailureReason,
    ) -> Result<(), ControllerError>;

    /// Hand the task back to the controller for another worker.
    async fn report_retry(&self, task_id: &TaskId) -> Result<(), ControllerError>;
}
