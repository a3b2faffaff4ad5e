//! Configuration loading

use anyhow::{Context, Result};
use pwa_cache_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Origin the cache sits in front of
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_origin_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: default_origin_url(),
            timeout_secs: default_timeout_secs(),
            skip_tls_verify: false,
            user_agent: None,
        }
    }
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origin_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_local_path() -> String {
    "./data/cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/pwa-cache.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackendKind::Local);
        assert_eq!(config.worker.version, "v1");
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 9000

[origin]
url = "https://app.example.com"
timeout_secs = 5

[worker]
version = "v2"
precache = ["/app.js", "/app.css"]
stale_while_revalidate = ["/index.html"]
max_age_secs = 60

[storage]
backend = "memory"

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.origin.url, "https://app.example.com");
        assert_eq!(config.origin.timeout_secs, 5);
        assert_eq!(config.worker.version, "v2");
        assert_eq!(config.worker.precache, vec!["/app.js", "/app.css"]);
        assert_eq!(config.worker.max_age_secs, 60);
        assert_eq!(config.worker.sweep_debounce_secs, 20);
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.storage.local.path, "./data/cache");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[storage]\nbackend = \"s3\"\n").unwrap();

        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }
}
