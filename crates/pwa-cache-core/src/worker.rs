//! Cache worker lifecycle
//!
//! A worker moves through `parsed → installing → installed → activating →
//! activated` and never backwards. A failed install leaves it redundant.
//! Fetch events are only intercepted once activation has claimed clients;
//! before that every request passes through.

use bytes::Bytes;
use http::{Request, Response};
use parking_lot::{Mutex, RwLock};
use pwa_cache_proxy::Fetcher;
use pwa_cache_storage::CacheStore;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStorage, DebouncedSweeper, GenerationManager};
use crate::config::{WorkerConfig, RUNTIME_PARTITION};
use crate::error::CoreError;
use crate::exchange::RequestInfo;
use crate::router::{Policy, PolicyRouter};
use crate::strategy::FetchStrategies;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the worker never controls pages
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a fetch event
#[derive(Debug)]
pub enum FetchOutcome {
    /// The worker answered the request
    Responded(Response<Bytes>),
    /// Not intercepted; the host should send the request on unchanged
    PassThrough(Request<Bytes>),
}

/// Cache worker
pub struct CacheWorker {
    config: WorkerConfig,
    precache_partition: String,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    router: PolicyRouter,
    sweeper: Arc<DebouncedSweeper>,
    generations: GenerationManager,
    strategies: FetchStrategies,
    tasks: TaskTracker,
    state: RwLock<WorkerState>,
    clients_claimed: AtomicBool,
    /// Set once by `shutdown`; the task tracker is never reopened after it
    shutting_down: Mutex<bool>,
}

impl CacheWorker {
    /// Create a worker for `config`
    ///
    /// Must be called inside a tokio runtime; the expiry sweeper task is
    /// spawned here.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let storage = CacheStorage::new(store);
        let tasks = TaskTracker::new();
        let sweeper = Arc::new(DebouncedSweeper::spawn(
            storage.partition(RUNTIME_PARTITION),
            config.max_age(),
            config.sweep_debounce(),
        ));
        let strategies =
            FetchStrategies::new(storage.clone(), fetcher.clone(), sweeper.clone(), tasks.clone());

        info!(
            "Initializing cache worker {} ({} precached, {} revalidated)",
            config.version,
            config.precache.len(),
            config.stale_while_revalidate.len()
        );

        Ok(Self {
            precache_partition: config.precache_partition(),
            router: PolicyRouter::from_config(&config),
            generations: GenerationManager::new(storage.clone(), &config),
            config,
            storage,
            fetcher,
            sweeper,
            strategies,
            tasks,
            state: RwLock::new(WorkerState::Parsed),
            clients_claimed: AtomicBool::new(false),
            shutting_down: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn sweeper(&self) -> &DebouncedSweeper {
        &self.sweeper
    }

    /// Whether fetch events are being intercepted
    pub fn controls_clients(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), CoreError> {
        let mut state = self.state.write();
        if *state != from {
            return Err(CoreError::Lifecycle(format!(
                "cannot move to {} while {}",
                to, *state
            )));
        }
        debug!("Worker {}: {} -> {}", self.config.version, from, to);
        *state = to;
        Ok(())
    }

    /// Install event: populate the precache partition
    ///
    /// Any failure is fatal; the worker becomes redundant and never reaches
    /// installed.
    pub async fn install(&self) -> Result<(), CoreError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        info!(
            "Installing worker {}, precaching {} resources into {}",
            self.config.version,
            self.config.precache.len(),
            self.precache_partition
        );

        match self
            .storage
            .populate(
                &self.precache_partition,
                self.fetcher.as_ref(),
                &self.config.precache,
            )
            .await
        {
            Ok(_) => {
                self.transition(WorkerState::Installing, WorkerState::Installed)?;
                info!("Worker {} installed", self.config.version);
                Ok(())
            }
            Err(e) => {
                *self.state.write() = WorkerState::Redundant;
                error!("Worker {} failed to install: {}", self.config.version, e);
                Err(e)
            }
        }
    }

    /// Activate event: reclaim old generations, claim clients, sweep
    ///
    /// Cleanup is best-effort; activation always completes.
    pub async fn activate(&self) -> Result<(), CoreError> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        info!("Activating worker {}", self.config.version);

        match self.generations.clear_old().await {
            Ok(deleted) if !deleted.is_empty() => {
                info!("Removed {} old cache partitions", deleted.len())
            }
            Ok(_) => debug!("No old cache partitions to remove"),
            Err(e) => warn!("Old cache cleanup incomplete, continuing: {}", e),
        }

        if let Err(e) = self.storage.open(RUNTIME_PARTITION).await {
            warn!("Failed to open {}: {}", RUNTIME_PARTITION, e);
        }

        self.claim_clients();
        self.sweeper.trigger();

        self.transition(WorkerState::Activating, WorkerState::Activated)?;
        info!("Worker {} activated", self.config.version);
        Ok(())
    }

    fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::Release);
        debug!("Worker {} now controls clients", self.config.version);
    }

    /// Fetch event: route the request and run its strategy
    ///
    /// Only a network failure with nothing cached is returned as an error.
    pub async fn handle_fetch(&self, request: Request<Bytes>) -> Result<FetchOutcome, CoreError> {
        if !self.controls_clients() || !request.is_cacheable_method() {
            return Ok(FetchOutcome::PassThrough(request));
        }

        let policy = self.router.classify(&request.identity());
        debug!("{} {} -> {}", request.method(), request.uri(), policy);
        self.sweeper.trigger();

        let response = match policy {
            Policy::CacheFirst => self.strategies.cache_first(request).await?,
            Policy::StaleWhileRevalidate => self.strategies.stale_while_revalidate(request).await?,
            Policy::PassThrough => return Ok(FetchOutcome::PassThrough(request)),
        };

        Ok(FetchOutcome::Responded(response))
    }

    /// Wait until every background cache write spawned so far has finished
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;

        // Held across reopen so shutdown cannot close in between
        let shutting_down = self.shutting_down.lock();
        if !*shutting_down {
            self.tasks.reopen();
        }
        drop(shutting_down);
    }

    /// Stop accepting work and wait for in-flight background work
    ///
    /// Revalidation writes and a sweep already in progress run to
    /// completion; a sweep still inside its quiet window is dropped.
    pub async fn shutdown(&self) {
        self.clients_claimed.store(false, Ordering::Release);
        {
            let mut shutting_down = self.shutting_down.lock();
            *shutting_down = true;
            self.tasks.close();
        }
        info!(
            "Waiting for {} background cache tasks",
            self.tasks.len()
        );
        self.sweeper.shutdown().await;
        self.tasks.wait().await;
    }
}
