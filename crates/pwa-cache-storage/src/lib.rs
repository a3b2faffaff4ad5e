//! PWA Cache Storage Layer
//!
//! This crate provides the partitioned response store behind the cache
//! engine, with a durable local disk backend and an in-memory backend.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{CacheStore, EntryRecord, StoredHeaderValue};
pub use error::StorageError;
pub use local::LocalStore;
pub use memory::MemoryStore;
