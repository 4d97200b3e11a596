//! Wiring of a running agent from its configuration.

use std::sync::Arc;

use axum::Router;

use crate::config::WorkerConfig;
use crate::controller::HttpController;
use crate::error::Result;
use crate::identity::WorkerIdentity;
use crate::package::Packager;
use crate::server::agent_routes;
use crate::staging::{FsDiskGuard, HttpFetcher, Stager, StagingPipeline, WorkLayout};
use crate::storage::create_storage;
use crate::task::{AgentHandle, TaskMachine, spawn_poll_loop};

/// Task machine and poll loop, both running.
pub struct RunningAgent {
    pub handle: AgentHandle,
    /// Worker name reported to the controller.
    pub worker: String,
}

impl RunningAgent {
    pub fn routes(&self) -> Router {
        agent_routes(self.handle.clone())
    }
}

/// Build every component from `config`, then start the task machine and the
/// poll loop.
pub async fn start(
    config: &WorkerConfig,
    http: reqwest::Client,
    identity: WorkerIdentity,
) -> Result<RunningAgent> {
    let controller = HttpController::new(
        &config.controller_url,
        identity,
        config.queue.clone(),
        config.language.clone(),
        config.sampling_rate.clone(),
        config.controller_timeout,
    )?;
    let storage = create_storage(&config.storage)?;

    let layout = WorkLayout::new(&config.work_dir);
    layout.ensure_dirs().await?;

    let staging = StagingPipeline::new(
        Arc::new(HttpFetcher::new(http)),
        Arc::new(FsDiskGuard::new(&config.work_dir)),
        Stager::new(layout.clone()),
    );
    let packager = Arc::new(Packager::new(layout, storage));

    let worker = controller.identity().to_string();
    let handle = TaskMachine::spawn(
        Arc::new(controller),
        staging,
        packager,
        config.decoder_start_timeout,
    );
    spawn_poll_loop(handle.clone(), config.poll_interval);

    Ok(RunningAgent { handle, worker })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;
    use crate::error::{ControllerError, Error};
    use crate::task::TaskState;

    fn config(controller_url: &str, work_dir: &Path, uploads: &Path) -> WorkerConfig {
        let env: HashMap<&str, String> = HashMap::from([
            ("TASKCONTROLLER_URL", controller_url.to_string()),
            ("USE_STORAGE", "local".to_string()),
            ("LOCAL_STORAGE_PATH", uploads.display().to_string()),
            ("WORK_DIR", work_dir.display().to_string()),
        ]);
        WorkerConfig::from_source(&|key: &str| env.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn started_agent_is_idle_and_polling() {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let config = config("http://127.0.0.1:9", work.path(), uploads.path());

        let agent = start(
            &config,
            reqwest::Client::new(),
            WorkerIdentity::new("127.0.0.1", "test-host"),
        )
        .await
        .unwrap();

        assert_eq!(agent.worker, "127.0.0.1-test-host");
        let snapshot = agent.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, TaskState::Idle);
        assert!(snapshot.polling);
        for dir in ["input", "output", "details"] {
            assert!(work.path().join(dir).is_dir(), "{dir} missing");
        }
    }

    #[tokio::test]
    async fn invalid_controller_url_is_controller_error() {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let config = config("not a url", work.path(), uploads.path());

        let result = start(
            &config,
            reqwest::Client::new(),
            WorkerIdentity::new("127.0.0.1", "test-host"),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::Controller(ControllerError::InvalidUrl(_)))
        ));
        assert!(!work.path().join("input").exists());
    }

    #[tokio::test]
    async fn unwritable_work_dir_is_io_error() {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let blocker = work.path().join("occupied");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = config("http://127.0.0.1:9", &blocker, uploads.path());

        let result = start(
            &config,
            reqwest::Client::new(),
            WorkerIdentity::new("127.0.0.1", "test-host"),
        )
        .await;

        assert!(matches!(result, Err(Error::Io(_))));
    }
}
