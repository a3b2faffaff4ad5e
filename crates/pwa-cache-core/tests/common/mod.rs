//! Shared fixtures for worker integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use parking_lot::Mutex;
use pwa_cache_core::{CacheWorker, WorkerConfig};
use pwa_cache_proxy::{Fetcher, ProxyError};
use pwa_cache_storage::{CacheStore, MemoryStore};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub enum Reply {
    Status(u16, &'static str),
    Unreachable,
}

/// Scripted network: answers by exact URI and records every call
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, uri: &str, reply: Reply) {
        self.replies.lock().insert(uri.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let uri = request.uri().to_string();
        self.calls.lock().push(uri.clone());

        let reply = self
            .replies
            .lock()
            .get(&uri)
            .cloned()
            .unwrap_or(Reply::Status(404, "not found"));

        match reply {
            Reply::Status(status, body) => Ok(Response::builder()
                .status(status)
                .header("date", http_date(chrono::Utc::now()))
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap()),
            Reply::Unreachable => Err(ProxyError::InvalidResponse(format!(
                "{} unreachable",
                uri
            ))),
        }
    }
}

pub fn http_date(date: chrono::DateTime<chrono::Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn get(uri: &str) -> Request<Bytes> {
    Request::get(uri).body(Bytes::new()).unwrap()
}

pub fn config(version: &str, precache: &[&str], revalidate: &[&str]) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        precache: precache.iter().map(|s| s.to_string()).collect(),
        stale_while_revalidate: revalidate.iter().map(|s| s.to_string()).collect(),
        max_age_secs: 10,
        sweep_debounce_secs: 20,
    }
}

pub fn worker(
    config: WorkerConfig,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<ScriptedFetcher>,
) -> CacheWorker {
    CacheWorker::new(config, store, fetcher).expect("failed to create worker")
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
