//! API routes

mod health;
mod intercept;
pub mod metrics;
mod partitions;

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        // Management API
        .merge(health::routes())
        .merge(partitions::routes())
        // Everything else is a fetch event
        .fallback(intercept::intercept)
        .with_state(state)
        .layer(DefaultBodyLimit::max(intercept::MAX_BODY_SIZE));

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
