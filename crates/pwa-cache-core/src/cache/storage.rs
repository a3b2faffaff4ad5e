//! Cache store adapter
//!
//! Thin named-partition handles over a `CacheStore` backend, plus the bulk
//! population used to precache a generation.

use bytes::Bytes;
use futures::future::try_join_all;
use http::{Request, Response};
use pwa_cache_proxy::Fetcher;
use pwa_cache_storage::CacheStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::exchange::RequestInfo;

/// Cache storage shared by the strategies, the sweeper and the generation
/// manager
#[derive(Clone)]
pub struct CacheStorage {
    store: Arc<dyn CacheStore>,
}

impl CacheStorage {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Open a partition, creating it if it does not exist
    pub async fn open(&self, name: &str) -> Result<Partition, CoreError> {
        self.store.open(name).await?;
        Ok(self.partition(name))
    }

    /// Handle to a partition without creating it
    ///
    /// Reads through the handle see an empty partition until something is
    /// written; the first write creates it.
    pub fn partition(&self, name: &str) -> Partition {
        Partition {
            store: self.store.clone(),
            name: name.to_string(),
        }
    }

    /// Look up a key across every partition
    pub async fn match_any(&self, key: &str) -> Result<Option<Response<Bytes>>, CoreError> {
        Ok(self.store.match_any(key).await?)
    }

    /// Names of all partitions in creation order
    pub async fn names(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.store.partitions().await?)
    }

    pub async fn has(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.store.has_partition(name).await?)
    }

    /// Delete a partition and all of its entries
    pub async fn delete(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.store.delete_partition(name).await?)
    }

    /// Fetch every resource and store the responses in partition `name`
    ///
    /// All resources are fetched before the partition is opened, so a
    /// failed fetch or a non-success status leaves no partition behind.
    pub async fn populate(
        &self,
        name: &str,
        fetcher: &dyn Fetcher,
        resources: &[String],
    ) -> Result<Partition, CoreError> {
        let requests = resources
            .iter()
            .map(|resource| {
                Request::get(resource.as_str())
                    .body(Bytes::new())
                    .map_err(|e| CoreError::Install(format!("{}: {}", resource, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.into_iter().map(|request| async move {
            let key = request.identity();
            let response = fetcher
                .fetch(&request)
                .await
                .map_err(|e| CoreError::Install(format!("{}: {}", key, e)))?;

            if !response.status().is_success() {
                return Err(CoreError::Install(format!(
                    "{} answered {}",
                    key,
                    response.status()
                )));
            }

            debug!("Fetched precache resource {}", key);
            Ok((key, response))
        }))
        .await?;

        let existed = self.has(name).await?;
        let partition = self.open(name).await?;

        for (key, response) in responses {
            if let Err(e) = partition.put(&key, response).await {
                warn!("Failed to store precache resource {}: {}", key, e);
                if !existed && let Err(e) = self.delete(name).await {
                    warn!("Failed to remove partial partition {}: {}", name, e);
                }
                return Err(CoreError::Install(format!("{}: {}", key, e)));
            }
        }

        info!("Populated partition {} with {} resources", name, resources.len());
        Ok(partition)
    }
}

/// Handle to one named partition
#[derive(Clone)]
pub struct Partition {
    store: Arc<dyn CacheStore>,
    name: String,
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<Response<Bytes>>, CoreError> {
        Ok(self.store.get(&self.name, key).await?)
    }

    /// Write or overwrite an entry
    pub async fn put(&self, key: &str, response: Response<Bytes>) -> Result<(), CoreError> {
        Ok(self.store.put(&self.name, key, response).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.store.delete(&self.name, key).await?)
    }

    pub async fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.store.keys(&self.name).await?)
    }
}
