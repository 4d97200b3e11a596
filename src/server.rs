//! Inbound HTTP surface: decoder callbacks and operator controls.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::task::{AgentHandle, ErrorCallback, RetryOutcome, StatusCallback};

pub const ALIVE_REPLY: &str = "Hello I am alive";
pub const STATUS_REPLY: &str = "Status received";
pub const ERROR_REPLY: &str = "Error received.";
pub const STOP_REPLY: &str = "Processing has finished and will not get new tasks.";
pub const RETRY_REPLY: &str = "Retry requested.";
pub const NO_TASK_REPLY: &str = "No task in progress.";

/// Shared state for the agent routes.
#[derive(Clone)]
pub struct AgentRouteState {
    pub agent: AgentHandle,
}

/// GET /
async fn alive() -> &'static str {
    ALIVE_REPLY
}

/// POST /status
///
/// Decoder progress. Acknowledged as soon as it is queued for the task machine.
async fn status(
    State(state): State<AgentRouteState>,
    Json(callback): Json<StatusCallback>,
) -> impl IntoResponse {
    match state.agent.decoder_status(callback).await {
        Ok(()) => (StatusCode::OK, STATUS_REPLY).into_response(),
        Err(e) => unavailable(e),
    }
}

/// POST /error
async fn error(
    State(state): State<AgentRouteState>,
    Json(callback): Json<ErrorCallback>,
) -> impl IntoResponse {
    match state.agent.decoder_error(callback).await {
        Ok(()) => (StatusCode::OK, ERROR_REPLY).into_response(),
        Err(e) => unavailable(e),
    }
}

/// GET /stop
///
/// Disables polling. Responds once the in-flight task, if any, has finished.
async fn stop(State(state): State<AgentRouteState>) -> impl IntoResponse {
    info!("Stop requested over HTTP");
    match state.agent.stop().await {
        Ok(()) => (StatusCode::OK, STOP_REPLY).into_response(),
        Err(e) => unavailable(e),
    }
}

/// GET /retry
async fn retry(State(state): State<AgentRouteState>) -> impl IntoResponse {
    info!("Retry requested over HTTP");
    match state.agent.retry().await {
        Ok(RetryOutcome::Requested) => (StatusCode::OK, RETRY_REPLY).into_response(),
        Ok(RetryOutcome::NoTask) => (StatusCode::OK, NO_TASK_REPLY).into_response(),
        Err(e) => unavailable(e),
    }
}

fn unavailable(e: AgentError) -> axum::response::Response {
    warn!(error = %e, "Request rejected");
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
}

/// Build the agent's HTTP routes.
pub fn agent_routes(agent: AgentHandle) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/status", post(status))
        .route("/error", post(error))
        .route("/stop", get(stop))
        .route("/retry", get(retry))
        .with_state(AgentRouteState { agent })
        .layer(TraceLayer::new_for_http())
}
