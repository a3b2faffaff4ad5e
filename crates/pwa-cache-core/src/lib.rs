//! PWA Cache Core Business Logic
//!
//! This crate provides the request-interception and cache-consistency
//! engine: policy routing, the cache-first and stale-while-revalidate
//! strategies, expiry sweeping and generation cleanup, tied together by the
//! worker lifecycle.

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod router;
pub mod strategy;
pub mod worker;

pub use cache::{
    is_expired, is_expired_at, CacheStorage, DebouncedSweeper, GenerationManager, Partition,
};
pub use config::{WorkerConfig, PRECACHE_PREFIX, RUNTIME_PARTITION};
pub use error::CoreError;
pub use exchange::{RequestInfo, ResponseInfo};
pub use router::{Policy, PolicyRouter};
pub use strategy::FetchStrategies;
pub use worker::{CacheWorker, FetchOutcome, WorkerState};
