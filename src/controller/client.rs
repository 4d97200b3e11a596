//! reqwest-backed controller client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info};

use super::Controller;
use super::types::{ReserveRequest, ReserveResponse, SuccessResult, TaskAction};
use crate::error::ControllerError;
use crate::identity::WorkerIdentity;
use crate::task::{FailureReason, Task, TaskId};

/// Controller client speaking the `/tasks` REST surface.
pub struct HttpController {
    client: reqwest::Client,
    base_url: Url,
    identity: WorkerIdentity,
    queue: String,
    language: String,
    sampling_rate: String,
}

impl HttpController {
    pub fn new(
        base_url: &str,
        identity: WorkerIdentity,
        queue: impl Into<String>,
        language: impl Into<String>,
        sampling_rate: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ControllerError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ControllerError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ControllerError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControllerError::RequestFailed {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            identity,
            queue: queue.into(),
            language: language.into(),
            sampling_rate: sampling_rate.into(),
        })
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// `<base>/tasks/actions`, or `<base>/tasks/<id>/actions` for a task.
    fn actions_url(&self, task_id: Option<&TaskId>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("tasks");
            if let Some(id) = task_id {
                segments.push(id.as_str());
            }
            segments.push("actions");
        }
        url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, ControllerError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ControllerError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControllerError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send_action(
        &self,
        task_id: Option<&TaskId>,
        action: TaskAction<'_>,
    ) -> Result<(), ControllerError> {
        let kind = action.kind();
        self.post(self.actions_url(task_id), &action).await?;
        debug!(
            task_id = task_id.map(TaskId::as_str).unwrap_or("-"),
            action = kind,
            "Action sent to controller"
        );
        Ok(())
    }
}

#[async_trait]
impl Controller for HttpController {
    async fn reserve(&self) -> Result<Option<Task>, ControllerError> {
        debug!(queue = %self.queue, "Checking for pending task");

        let body = ReserveRequest {
            kind: "reserve",
            worker: self.identity.name(),
            lang: &self.language,
            queue: &self.queue,
            sampling: &self.sampling_rate,
        };
        let response = self.post(self.actions_url(None), &body).await?;
        let parsed: ReserveResponse = response
            .json()
            .await
            .map_err(|e| ControllerError::InvalidResponse(e.to_string()))?;

        let Some(envelope) = parsed.task else {
            return Ok(None);
        };

        let task_id = envelope.task_id.clone();
        let offered_queue = envelope.queue.clone();
        match envelope.into_task_for_queue(&self.queue) {
            Some(task) => {
                info!(task_id = %task.task_id, filename = %task.filename, "Task received");
                Ok(Some(task))
            }
            None => {
                info!(
                    task_id = %task_id,
                    offered_queue = offered_queue.as_deref().unwrap_or("-"),
                    queue = %self.queue,
                    "Ignoring task reserved from another queue"
                );
                Ok(None)
            }
        }
    }

    async fn report_progress(
        &self,
        task_id: &TaskId,
        status: &str,
    ) -> Result<(), ControllerError> {
        self.send_action(
            Some(task_id),
            TaskAction::Progress {
                worker: self.identity.name(),
                progress: status,
            },
        )
        .await
    }

    async fn report_success(
        &self,
        task_id: &TaskId,
        location: &str,
    ) -> Result<(), ControllerError> {
        self.send_action(
            Some(task_id),
            TaskAction::Success {
                worker: self.identity.name(),
                result: SuccessResult {
                    cloud_link: location,
                },
            },
        )
        .await
    }

    async fn report_failure(
        &self,
        task_id: Option<&TaskId>,
        reason: &FailureReason,
    ) -> Result<(), ControllerError> {
        self.send_action(
            task_id,
            TaskAction::Error {
                worker: self.identity.name(),
                err_code: reason,
            },
        )
        .await
    }

    async fn report_retry(&self, task_id: &TaskId) -> Result<(), ControllerError> {
        self.send_action(
            Some(task_id),
            TaskAction::Retry {
                worker: self.identity.name(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(base: &str) -> HttpController {
        HttpController::new(
            base,
            WorkerIdentity::new("10.0.0.1", "host"),
            "normal",
            "english",
            "16khz",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn actions_url_for_collection_and_task() {
        let c = controller("http://controller:3000");
        assert_eq!(
            c.actions_url(None).as_str(),
            "http://controller:3000/tasks/actions"
        );
        assert_eq!(
            c.actions_url(Some(&TaskId::new("abc"))).as_str(),
            "http://controller:3000/tasks/abc/actions"
        );
    }

    #[test]
    fn actions_url_keeps_base_path_and_encodes_id() {
        let c = controller("http://controller/api/");
        assert_eq!(
            c.actions_url(Some(&TaskId::new("a b/c"))).as_str(),
            "http://controller/api/tasks/a%20b%2Fc/actions"
        );
    }

    #[test]
    fn invalid_base_url_rejected() {
        let err = HttpController::new(
            "not a url",
            WorkerIdentity::new("x", "y"),
            "normal",
            "english",
            "16khz",
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ControllerError::InvalidUrl(_)));
    }
}
