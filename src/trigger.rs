//! HTTP endpoint that starts jobs and answers immediately.

use crate::Runner;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

#[derive(Clone)]
struct TriggerState {
    runner: Arc<Runner>,
}

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub status: String,
    pub job_id: Uuid,
    pub initial_url: String,
}

pub fn router(runner: Arc<Runner>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(start_job))
        .with_state(TriggerState { runner })
}

/// Serve until the run context is shut down
pub async fn serve(runner: Arc<Runner>, bind_addr: &str) -> std::io::Result<()> {
    let shutdown = runner.context().shutdown.clone();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    ::log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(runner))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn health() -> &'static str {
    "ok"
}

/// POST /jobs - validate the secret and start a job in the background
async fn start_job(State(state): State<TriggerState>, Json(request): Json<JobRequest>) -> Response {
    let expected = &state.runner.context().config.evaluator.secret;
    if expected.is_empty() || request.secret != *expected {
        ::log::warn!("Rejected job request for {}: invalid secret", request.url);
        return (StatusCode::FORBIDDEN, Json(json!({"error": "invalid secret"}))).into_response();
    }

    if !matches!(Url::parse(&request.url), Ok(u) if u.scheme() == "http" || u.scheme() == "https") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "url must be an absolute http(s) URL"})),
        )
            .into_response();
    }

    let job_id = state.runner.spawn_job(request.url.clone());
    ::log::info!("[{}] Accepted job for {}", job_id, request.url);

    Json(JobAccepted {
        status: "worker started".to_string(),
        job_id,
        initial_url: request.url,
    })
    .into_response()
}
