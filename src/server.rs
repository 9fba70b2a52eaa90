//! Management HTTP server.
//!
//! Small control surface for operators and monitoring: report pipeline
//! state, flip the circuit breaker without restarting the process, and
//! expose the prometheus registry.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus::TextEncoder;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::pipeline::PipelineHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Pipeline status response.
#[derive(Serialize)]
struct StatusResponse {
    running: bool,
    paused: bool,
    jobs: i64,
}

/// Circuit breaker flip response.
#[derive(Serialize)]
struct BreakerResponse {
    paused: bool,
}

/// Build the management router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/circuit-breaker", post(flip_circuit_breaker))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Report pipeline state.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.pipeline.running(),
        paused: state.pipeline.paused(),
        jobs: state.pipeline.metrics().jobs.get(),
    })
}

/// Flip the circuit breaker and report the new state.
async fn flip_circuit_breaker(State(state): State<AppState>) -> Json<BreakerResponse> {
    Json(BreakerResponse {
        paused: state.pipeline.flip_circuit_breaker(),
    })
}

/// Render the prometheus registry in text exposition format.
async fn metrics(State(state): State<AppState>) -> Response {
    let families = state.pipeline.metrics().registry().gather();
    match TextEncoder::new().encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
