//! Cache management module

mod expiry;
mod generation;
mod storage;
mod sweeper;

pub use expiry::{is_expired, is_expired_at, parse_http_date};
pub use generation::GenerationManager;
pub use storage::{CacheStorage, Partition};
pub use sweeper::{sweep_expired, DebouncedSweeper};
