//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] pwa_cache_storage::StorageError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] pwa_cache_proxy::ProxyError),

    #[error("Install failed: {0}")]
    Install(String),

    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
