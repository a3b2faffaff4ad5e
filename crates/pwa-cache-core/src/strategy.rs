//! Fetch strategies
//!
//! Cache-first serves precached assets, stale-while-revalidate serves the
//! configured dynamic resources. Neither lets a cache failure fail the
//! request: lookups and writes that go wrong degrade to the network.

use bytes::Bytes;
use http::{Request, Response};
use pwa_cache_proxy::Fetcher;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, DebouncedSweeper, Partition};
use crate::config::RUNTIME_PARTITION;
use crate::error::CoreError;
use crate::exchange::{RequestInfo, ResponseInfo};

fn record(policy: &'static str, outcome: &'static str) {
    metrics::counter!("pwa_cache_requests_total", "policy" => policy, "outcome" => outcome)
        .increment(1);
}

/// The two request-handling algorithms
pub struct FetchStrategies {
    storage: CacheStorage,
    runtime: Partition,
    fetcher: Arc<dyn Fetcher>,
    sweeper: Arc<DebouncedSweeper>,
    tasks: TaskTracker,
}

impl FetchStrategies {
    /// Background revalidations are spawned on `tasks`
    pub fn new(
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        sweeper: Arc<DebouncedSweeper>,
        tasks: TaskTracker,
    ) -> Self {
        let runtime = storage.partition(RUNTIME_PARTITION);
        Self {
            storage,
            runtime,
            fetcher,
            sweeper,
            tasks,
        }
    }

    /// Serve from any partition; on a miss fetch, and keep a 200 in the
    /// runtime partition before returning it
    pub async fn cache_first(&self, request: Request<Bytes>) -> Result<Response<Bytes>, CoreError> {
        let key = request.identity();

        match self.storage.match_any(&key).await {
            Ok(Some(cached)) => {
                debug!("Cache hit for {}", key);
                record("cache_first", "hit");
                return Ok(cached);
            }
            Ok(None) => debug!("Cache miss for {}, fetching from network", key),
            Err(e) => {
                warn!("Cache lookup failed for {}, using network: {}", key, e);
                record("cache_first", "fallback");
                return Ok(self.fetcher.fetch(&request).await?);
            }
        }

        let response = self.fetcher.fetch(&request).await?;
        record("cache_first", "miss");

        if response.is_storable() {
            if let Err(e) = self.runtime.put(&key, response.snapshot()).await {
                warn!("Failed to cache {}: {}", key, e);
            }
        } else {
            debug!("Not caching {} ({})", key, response.status());
        }

        Ok(response)
    }

    /// Serve the runtime copy if one exists, otherwise wait for the network;
    /// either way refresh the runtime copy from the network
    ///
    /// The network fetch and its cache write run in a task on the worker's
    /// tracker and finish even when the caller was served from cache.
    pub async fn stale_while_revalidate(
        &self,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, CoreError> {
        self.sweeper.trigger();

        let key = request.identity();
        let network = self.spawn_revalidation(key.clone(), request.snapshot());

        match self.runtime.get(&key).await {
            Ok(Some(cached)) => {
                debug!("Serving cached {} while revalidating", key);
                record("stale_while_revalidate", "hit");
                return Ok(cached);
            }
            Ok(None) => debug!("No cached copy of {}, waiting for network", key),
            Err(e) => warn!("Cache lookup failed for {}, waiting for network: {}", key, e),
        }

        record("stale_while_revalidate", "miss");
        match network.await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("Revalidation of {} ended without a result, fetching directly", key);
                record("stale_while_revalidate", "fallback");
                Ok(self.fetcher.fetch(&request).await?)
            }
        }
    }

    fn spawn_revalidation(
        &self,
        key: String,
        request: Request<Bytes>,
    ) -> oneshot::Receiver<Result<Response<Bytes>, pwa_cache_proxy::ProxyError>> {
        let (tx, rx) = oneshot::channel();
        let fetcher = self.fetcher.clone();
        let runtime = self.runtime.clone();

        self.tasks.spawn(async move {
            let response = match fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Revalidation fetch for {} failed: {}", key, e);
                    let _ = tx.send(Err(e));
                    return;
                }
            };

            let snapshot = response.is_storable().then(|| response.snapshot());
            // The caller may already have been answered from cache
            let _ = tx.send(Ok(response));

            if let Some(snapshot) = snapshot {
                match runtime.put(&key, snapshot).await {
                    Ok(()) => debug!("Revalidated {}", key),
                    Err(e) => warn!("Failed to cache revalidated {}: {}", key, e),
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pwa_cache_proxy::ProxyError;
    use pwa_cache_storage::{CacheStore, MemoryStore, StorageError};
    use std::time::Duration;

    /// Answers every request with a fixed status and counts the calls
    struct CountingFetcher {
        status: u16,
        body: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl CountingFetcher {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
            self.calls.lock().push(request.uri().to_string());
            Ok(Response::builder()
                .status(self.status)
                .body(Bytes::from_static(self.body.as_bytes()))
                .unwrap())
        }
    }

    /// A store whose reads and writes all fail
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn open(&self, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn has_partition(&self, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn partitions(&self) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn delete_partition(&self, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn get(&self, _: &str, _: &str) -> Result<Option<Response<Bytes>>, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn put(&self, _: &str, _: &str, _: Response<Bytes>) -> Result<(), StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
        async fn keys(&self, _: &str) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Corrupt("broken".to_string()))
        }
    }

    /// Reads from an in-memory store, refuses every write
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn open(&self, partition: &str) -> Result<(), StorageError> {
            self.inner.open(partition).await
        }
        async fn has_partition(&self, partition: &str) -> Result<bool, StorageError> {
            self.inner.has_partition(partition).await
        }
        async fn partitions(&self) -> Result<Vec<String>, StorageError> {
            self.inner.partitions().await
        }
        async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
            self.inner.delete_partition(partition).await
        }
        async fn get(
            &self,
            partition: &str,
            key: &str,
        ) -> Result<Option<Response<Bytes>>, StorageError> {
            self.inner.get(partition, key).await
        }
        async fn put(&self, _: &str, _: &str, _: Response<Bytes>) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
        async fn delete(&self, partition: &str, key: &str) -> Result<bool, StorageError> {
            self.inner.delete(partition, key).await
        }
        async fn keys(&self, partition: &str) -> Result<Vec<String>, StorageError> {
            self.inner.keys(partition).await
        }
    }

    fn strategies(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<CountingFetcher>,
    ) -> (FetchStrategies, CacheStorage, TaskTracker) {
        let storage = CacheStorage::new(store);
        let sweeper = Arc::new(DebouncedSweeper::spawn(
            storage.partition(RUNTIME_PARTITION),
            Duration::from_secs(10),
            Duration::from_secs(20),
        ));
        let tasks = TaskTracker::new();
        let strategies = FetchStrategies::new(storage.clone(), fetcher, sweeper, tasks.clone());
        (strategies, storage, tasks)
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::get(uri).body(Bytes::new()).unwrap()
    }

    async fn drain(tasks: &TaskTracker) {
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let fetcher = CountingFetcher::new(200, "network");
        let (strategies, storage, _) = strategies(Arc::new(MemoryStore::new()), fetcher.clone());
        storage
            .partition("pre-cache-v2")
            .put("/app.js", Response::new(Bytes::from_static(b"cached")))
            .await
            .unwrap();

        let response = strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"cached");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_stores_in_runtime() {
        let fetcher = CountingFetcher::new(200, "network");
        let (strategies, storage, _) = strategies(Arc::new(MemoryStore::new()), fetcher.clone());

        let response = strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"network");
        assert_eq!(fetcher.calls(), 1);

        let stored = storage.partition(RUNTIME_PARTITION).get("/app.js").await.unwrap();
        assert_eq!(stored.unwrap().body().as_ref(), b"network");

        // Second request is a hit
        strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_non_200() {
        let fetcher = CountingFetcher::new(404, "missing");
        let (strategies, storage, _) = strategies(Arc::new(MemoryStore::new()), fetcher.clone());

        let response = strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
        assert!(storage.match_any("/app.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_broken_store_falls_back_to_network() {
        let fetcher = CountingFetcher::new(200, "network");
        let (strategies, _, _) = strategies(Arc::new(BrokenStore), fetcher.clone());

        let response = strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"network");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_revalidate_serves_cached_and_refreshes() {
        let fetcher = CountingFetcher::new(200, "fresh");
        let (strategies, storage, tasks) =
            strategies(Arc::new(MemoryStore::new()), fetcher.clone());
        let runtime = storage.partition(RUNTIME_PARTITION);
        runtime
            .put("/index.html", Response::new(Bytes::from_static(b"stale")))
            .await
            .unwrap();

        let response = strategies
            .stale_while_revalidate(get("/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"stale");

        drain(&tasks).await;
        assert_eq!(fetcher.calls(), 1);
        let refreshed = runtime.get("/index.html").await.unwrap().unwrap();
        assert_eq!(refreshed.body().as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn test_revalidate_empty_cache_waits_for_network() {
        let fetcher = CountingFetcher::new(200, "fresh");
        let (strategies, storage, tasks) =
            strategies(Arc::new(MemoryStore::new()), fetcher.clone());

        let response = strategies
            .stale_while_revalidate(get("/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"fresh");

        drain(&tasks).await;
        let stored = storage.partition(RUNTIME_PARTITION).get("/index.html").await.unwrap();
        assert_eq!(stored.unwrap().status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_revalidate_broken_store_uses_network() {
        let fetcher = CountingFetcher::new(200, "fresh");
        let (strategies, _, tasks) = strategies(Arc::new(BrokenStore), fetcher.clone());

        let response = strategies
            .stale_while_revalidate(get("/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"fresh");

        drain(&tasks).await;
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_failed_write_still_returns_response() {
        let fetcher = CountingFetcher::new(200, "network");
        let (strategies, storage, _) =
            strategies(Arc::new(ReadOnlyStore::default()), fetcher.clone());

        let response = strategies.cache_first(get("/app.js")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.body().as_ref(), b"network");
        assert!(storage.match_any("/app.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revalidate_failed_write_still_returns_response() {
        let fetcher = CountingFetcher::new(200, "fresh");
        let (strategies, storage, tasks) =
            strategies(Arc::new(ReadOnlyStore::default()), fetcher.clone());

        let response = strategies
            .stale_while_revalidate(get("/index.html"))
            .await
            .unwrap();
        assert_eq!(response.body().as_ref(), b"fresh");

        drain(&tasks).await;
        assert_eq!(fetcher.calls(), 1);
        let stored = storage.partition(RUNTIME_PARTITION).get("/index.html").await.unwrap();
        assert!(stored.is_none());
    }
}
