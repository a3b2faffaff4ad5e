//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use pwa_cache_core::CacheWorker;
use pwa_cache_proxy::Fetcher;
use std::sync::Arc;
use url::Url;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<CacheWorker>,
    /// Used to forward requests the worker passes through
    pub fetcher: Arc<dyn Fetcher>,
    /// Origin that incoming paths are resolved against
    pub origin: Url,
}

impl AppState {
    pub fn new(worker: Arc<CacheWorker>, fetcher: Arc<dyn Fetcher>, origin: Url) -> Self {
        Self {
            worker,
            fetcher,
            origin,
        }
    }
}

/// Handle to the installed Prometheus recorder
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Render the current metrics in the Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
