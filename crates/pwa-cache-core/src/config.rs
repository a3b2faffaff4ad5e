//! Worker configuration
//!
//! Supplied by the host: the version tag naming the current precache
//! generation, the precache resource list, the stale-while-revalidate URL
//! list and the runtime expiry settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::CoreError;

/// Name of the runtime partition, stable across versions
pub const RUNTIME_PARTITION: &str = "runtime-cache";

/// Prefix of every precache partition name
pub const PRECACHE_PREFIX: &str = "pre-cache-";

/// Configuration for a cache worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Version tag of the current precache generation
    #[serde(default = "default_version")]
    pub version: String,
    /// Resources fetched at install time and served cache-first
    #[serde(default)]
    pub precache: Vec<String>,
    /// Exact URLs served stale-while-revalidate
    #[serde(default)]
    pub stale_while_revalidate: Vec<String>,
    /// Lifetime of runtime entries in seconds
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Quiet window of the expiry sweeper in seconds
    #[serde(default = "default_sweep_debounce_secs")]
    pub sweep_debounce_secs: u64,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_max_age_secs() -> u64 {
    10
}

fn default_sweep_debounce_secs() -> u64 {
    20
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            precache: Vec::new(),
            stale_while_revalidate: Vec::new(),
            max_age_secs: default_max_age_secs(),
            sweep_debounce_secs: default_sweep_debounce_secs(),
        }
    }
}

impl WorkerConfig {
    /// Name of the precache partition for this version
    pub fn precache_partition(&self) -> String {
        format!("{}{}", PRECACHE_PREFIX, self.version)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_debounce(&self) -> Duration {
        Duration::from_secs(self.sweep_debounce_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.version.trim().is_empty() {
            return Err(CoreError::Config("version must not be empty".to_string()));
        }
        if self.version.chars().any(char::is_control) {
            return Err(CoreError::Config(format!(
                "version contains control characters: {:?}",
                self.version
            )));
        }
        if self.precache_partition() == RUNTIME_PARTITION {
            return Err(CoreError::Config(format!(
                "precache partition name collides with {}",
                RUNTIME_PARTITION
            )));
        }
        if self.precache.iter().any(|r| r.is_empty())
            || self.stale_while_revalidate.iter().any(|r| r.is_empty())
        {
            return Err(CoreError::Config(
                "resource identifiers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve origin-relative identifiers (`/app.js`) against `origin`
    ///
    /// Absolute URLs and identifiers that fail to resolve are kept as-is.
    pub fn resolve_against(&self, origin: &Url) -> Self {
        let resolve = |entries: &[String]| -> Vec<String> {
            entries
                .iter()
                .map(|entry| {
                    if !entry.starts_with('/') {
                        return entry.clone();
                    }
                    match origin.join(entry) {
                        Ok(url) => url.to_string(),
                        Err(e) => {
                            warn!("Cannot resolve {} against {}: {}", entry, origin, e);
                            entry.clone()
                        }
                    }
                })
                .collect()
        };

        Self {
            precache: resolve(&self.precache),
            stale_while_revalidate: resolve(&self.stale_while_revalidate),
            ..self.clone()
        }
    }
}
