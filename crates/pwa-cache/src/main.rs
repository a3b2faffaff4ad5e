//! PWA Cache - offline-first caching proxy for progressive web apps

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

mod config;

use config::{Config, LogFormat, StorageBackendKind};
use pwa_cache_api::{create_router, AppState, MetricsHandle};
use pwa_cache_core::CacheWorker;
use pwa_cache_proxy::{Fetcher, HttpFetcher, HttpFetcherConfig};
use pwa_cache_storage::{CacheStore, LocalStore, MemoryStore};

/// PWA Cache - offline-first caching proxy for progressive web apps
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "PWA_CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "PWA_CACHE_PORT")]
    port: Option<u16>,

    /// Origin URL
    #[arg(long, env = "PWA_CACHE_ORIGIN")]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(origin) = args.origin {
        config.origin.url = origin;
    }

    init_logging(&config.logging.level, config.logging.format);

    info!("Starting PWA Cache v{}", env!("CARGO_PKG_VERSION"));

    let origin = Url::parse(&config.origin.url)
        .with_context(|| format!("Invalid origin URL: {}", config.origin.url))?;

    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(MetricsHandle::new(handle)))
    } else {
        None
    };

    // Initialize storage backend
    let store: Arc<dyn CacheStore> = match config.storage.backend {
        StorageBackendKind::Local => {
            tokio::fs::create_dir_all(&config.storage.local.path).await?;
            Arc::new(LocalStore::new(&config.storage.local.path).await?)
        }
        StorageBackendKind::Memory => {
            warn!("Using in-memory storage, cached responses are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize origin client
    let mut fetcher_config = HttpFetcherConfig {
        origin: Some(origin.to_string()),
        timeout: Duration::from_secs(config.origin.timeout_secs),
        skip_tls_verify: config.origin.skip_tls_verify,
        ..HttpFetcherConfig::default()
    };
    if let Some(user_agent) = &config.origin.user_agent {
        fetcher_config.user_agent = user_agent.clone();
    }
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(fetcher_config)?);

    // Install and activate the worker before accepting traffic
    let worker_config = config.worker.resolve_against(&origin);
    let worker = Arc::new(CacheWorker::new(worker_config, store, fetcher.clone())?);
    worker
        .install()
        .await
        .context("Precaching failed, refusing to start")?;
    worker.activate().await?;

    let state = AppState::new(worker.clone(), fetcher, origin.clone());
    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);
    info!("Origin: {}", origin);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
