//! Cache generation cleanup

use futures::future::join_all;
use tracing::{info, warn};

use super::storage::CacheStorage;
use crate::config::{WorkerConfig, RUNTIME_PARTITION};
use crate::error::CoreError;

/// Reclaims partitions left behind by earlier versions
///
/// Only the current precache partition and the runtime partition survive;
/// the runtime partition is kept across versions.
pub struct GenerationManager {
    storage: CacheStorage,
    keep: Vec<String>,
}

impl GenerationManager {
    pub fn new(storage: CacheStorage, config: &WorkerConfig) -> Self {
        Self {
            storage,
            keep: vec![config.precache_partition(), RUNTIME_PARTITION.to_string()],
        }
    }

    /// Partitions that survive cleanup
    pub fn kept(&self) -> &[String] {
        &self.keep
    }

    /// Delete every partition outside the current generation
    ///
    /// All deletions are attempted even when one fails; the first failure
    /// is returned after the rest have run.
    pub async fn clear_old(&self) -> Result<Vec<String>, CoreError> {
        let stale: Vec<String> = self
            .storage
            .names()
            .await?
            .into_iter()
            .filter(|name| !self.keep.contains(name))
            .collect();

        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut deleted = Vec::new();
        let mut failure = None;
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    info!("Deleted old cache partition {}", name);
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to delete old cache partition {}: {}", name, e);
                    failure.get_or_insert(e);
                }
            }
        }

        metrics::counter!("pwa_cache_generations_deleted_total").increment(deleted.len() as u64);

        match failure {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }
}
