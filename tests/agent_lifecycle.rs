//! End-to-end tests for the agent.
//!
//! A fake controller serves one task and its audio file. The real task
//! machine, poll loop, local storage and callback server run against it, and
//! the tests play the decoder by calling the callback endpoints.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use decode_agent::config::StorageConfig;
use decode_agent::controller::HttpController;
use decode_agent::identity::WorkerIdentity;
use decode_agent::package::Packager;
use decode_agent::server::{STATUS_REPLY, STOP_REPLY, agent_routes};
use decode_agent::staging::{FsDiskGuard, HttpFetcher, Stager, StagingPipeline, WorkLayout};
use decode_agent::storage::create_storage;
use decode_agent::task::{AgentHandle, TaskMachine, TaskState, spawn_poll_loop};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt not really audio";

type Actions = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Clone)]
struct FakeController {
    pending: Arc<Mutex<Option<Value>>>,
    actions: Actions,
}

async fn reserve(State(state): State<FakeController>, Json(body): Json<Value>) -> Json<Value> {
    if body["type"] != "reserve" {
        state.actions.lock().unwrap().push(("-".into(), body));
        return Json(json!({}));
    }
    let task = state.pending.lock().unwrap().take();
    Json(json!({ "task": task }))
}

async fn task_action(
    State(state): State<FakeController>,
    UrlPath(task_id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.actions.lock().unwrap().push((task_id, body));
    Json(json!({}))
}

async fn audio() -> &'static [u8] {
    AUDIO
}

/// Start a fake controller offering one `filename` task, return (url, actions).
async fn start_controller(filename: &str) -> (String, Actions) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

    let state = FakeController {
        pending: Arc::new(Mutex::new(Some(json!({
            "task_id": "task-9",
            "queue": "normal",
            "data": {
                "filename": filename,
                "cloud-link": format!("{base}/files/{filename}")
            }
        })))),
        actions: Actions::default(),
    };
    let actions = Arc::clone(&state.actions);

    let app = Router::new()
        .route("/tasks/actions", post(reserve))
        .route("/tasks/{task_id}/actions", post(task_action))
        .route("/files/{name}", get(audio))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base, actions)
}

struct Agent {
    url: String,
    handle: AgentHandle,
    http: reqwest::Client,
}

impl Agent {
    async fn post_status(&self, filename: &str, status: &str) {
        let reply = self
            .http
            .post(format!("{}/status", self.url))
            .json(&json!({ "filename": filename, "status": status, "channel": 1 }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(reply, STATUS_REPLY);
    }

    async fn get_text(&self, path: &str) -> String {
        self.http
            .get(format!("{}{}", self.url, path))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    }

    async fn wait_for_state(&self, state: TaskState) {
        loop {
            if self.handle.snapshot().await.unwrap().state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Wire the agent against `controller_url` and serve its routes on a random port.
async fn start_agent(
    controller_url: &str,
    work_dir: &Path,
    uploads: &Path,
    decoder_start_timeout: Duration,
) -> Agent {
    let http = reqwest::Client::new();
    let controller = HttpController::new(
        controller_url,
        WorkerIdentity::new("127.0.0.1", "test-host"),
        "normal",
        "english",
        "16khz",
        Duration::from_secs(2),
    )
    .unwrap();
    let storage = create_storage(&StorageConfig::Local {
        path: uploads.to_path_buf(),
    })
    .unwrap();

    let layout = WorkLayout::new(work_dir);
    layout.ensure_dirs().await.unwrap();
    let staging = StagingPipeline::new(
        Arc::new(HttpFetcher::new(http.clone())),
        Arc::new(FsDiskGuard::new(work_dir)),
        Stager::new(layout.clone()),
    );
    let packager = Arc::new(Packager::new(layout, storage));

    let handle = TaskMachine::spawn(
        Arc::new(controller),
        staging,
        packager,
        decoder_start_timeout,
    );
    spawn_poll_loop(handle.clone(), Duration::from_millis(20));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let app = agent_routes(handle.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Agent { url, handle, http }
}

fn action_types(actions: &Actions) -> Vec<String> {
    actions
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, body)| body["type"] != "progress")
        .map(|(_, body)| body["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn wait_for_action(actions: &Actions, kind: &str) -> Value {
    loop {
        let found = actions
            .lock()
            .unwrap()
            .iter()
            .find(|(_, body)| body["type"] == kind)
            .map(|(_, body)| body.clone());
        if let Some(body) = found {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn decoded_task_is_uploaded_and_reported() {
    timeout(TEST_TIMEOUT, async {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let (controller_url, actions) = start_controller("call.wav").await;
        let agent = start_agent(
            &controller_url,
            work.path(),
            uploads.path(),
            Duration::from_secs(30),
        )
        .await;

        agent.wait_for_state(TaskState::AwaitingDecoderStart).await;
        let staged = std::fs::read(work.path().join("input/call.wav")).unwrap();
        assert_eq!(staged, AUDIO);

        let output = work.path().join("output/call");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("call.txt"), "hello").unwrap();
        std::fs::write(output.join("call.json"), "{}").unwrap();

        agent.post_status("call.wav", "STARTING").await;
        agent.post_status("call.wav", "DONE channel-1").await;

        let success = wait_for_action(&actions, "success").await;
        let link = success["result"]["cloud-link"].as_str().unwrap();
        assert!(link.starts_with("file://"));
        assert!(link.ends_with("/call.zip"));
        assert_eq!(success["worker"], "127.0.0.1-test-host");
        assert!(uploads.path().join("call.zip").exists());

        agent.wait_for_state(TaskState::Idle).await;
        assert!(!work.path().join("input/call.wav").exists());
        assert!(!output.exists());

        assert_eq!(agent.get_text("/stop").await, STOP_REPLY);
        assert_eq!(action_types(&actions), vec!["success"]);
        assert!(
            actions
                .lock()
                .unwrap()
                .iter()
                .all(|(task_id, _)| task_id == "task-9")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn silent_decoder_fails_task() {
    timeout(TEST_TIMEOUT, async {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let (controller_url, actions) = start_controller("call.mp3").await;
        let agent = start_agent(
            &controller_url,
            work.path(),
            uploads.path(),
            Duration::from_millis(200),
        )
        .await;

        let error = wait_for_action(&actions, "error").await;
        assert_eq!(error["err_code"], "DECODER_DID_NOT_START");

        agent.wait_for_state(TaskState::Idle).await;
        assert!(!work.path().join("input/call.mp3").exists());
        assert_eq!(agent.get_text("/retry").await, "No task in progress.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn retry_hands_task_back() {
    timeout(TEST_TIMEOUT, async {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let (controller_url, actions) = start_controller("call.flac").await;
        let agent = start_agent(
            &controller_url,
            work.path(),
            uploads.path(),
            Duration::from_secs(30),
        )
        .await;

        agent.wait_for_state(TaskState::AwaitingDecoderStart).await;
        agent.post_status("call.flac", "STARTING").await;

        assert_eq!(agent.get_text("/retry").await, "Retry requested.");
        wait_for_action(&actions, "retry").await;
        assert!(work.path().join("input/call.flac").exists());

        let snapshot = agent.handle.snapshot().await.unwrap();
        assert!(!snapshot.busy);
        assert!(!snapshot.polling);
        assert_eq!(action_types(&actions), vec!["retry"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unsupported_file_rejected_before_download() {
    timeout(TEST_TIMEOUT, async {
        let work = tempfile::tempdir().unwrap();
        let uploads = tempfile::tempdir().unwrap();
        let (controller_url, actions) = start_controller("notes.xyz").await;
        let _agent = start_agent(
            &controller_url,
            work.path(),
            uploads.path(),
            Duration::from_secs(30),
        )
        .await;

        let error = wait_for_action(&actions, "error").await;
        assert_eq!(error["err_code"], "FILE_EXTENSION_NOT_SUPPORTED");
        assert!(!work.path().join("input/notes.xyz").exists());
    })
    .await
    .expect("test timed out");
}
