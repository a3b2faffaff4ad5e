//! Cache partition inspection

use axum::{Json, Router, extract::State, routing::get};
use pwa_cache_core::RUNTIME_PARTITION;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: usize,
    /// Whether the worker keeps this partition across activations
    pub current: bool,
}

#[derive(Serialize)]
pub struct PartitionsResponse {
    pub partitions: Vec<PartitionSummary>,
}

/// GET /_cache/partitions
async fn list_partitions(State(state): State<AppState>) -> Result<Json<PartitionsResponse>, ApiError> {
    let storage = state.worker.storage();
    let precache = state.worker.config().precache_partition();

    let mut partitions = Vec::new();
    for name in storage.names().await? {
        let entries = storage.partition(&name).keys().await?.len();
        partitions.push(PartitionSummary {
            current: name == precache || name == RUNTIME_PARTITION,
            name,
            entries,
        });
    }

    Ok(Json(PartitionsResponse { partitions }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/_cache/partitions", get(list_partitions))
}
