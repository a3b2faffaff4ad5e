//! Health check endpoint

use axum::{Json, Router, extract::State, routing::get};
use pwa_cache_core::WorkerState;
use serde::Serialize;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Version tag of the running cache generation
    pub cache_version: String,
    pub state: WorkerState,
}

/// Health check handler
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    metrics::counter!("pwa_cache_health_checks_total").increment(1);

    let worker_state = state.worker.state();
    let status = match worker_state {
        WorkerState::Activated => "healthy",
        WorkerState::Redundant => "failed",
        _ => "starting",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_version: state.worker.config().version.clone(),
        state: worker_state,
    })
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/_cache/health", get(health))
}
