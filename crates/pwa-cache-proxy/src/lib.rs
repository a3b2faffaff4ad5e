//! PWA Cache Network Fetcher
//!
//! This crate provides the network side of the cache: the `Fetcher` seam
//! the strategies call on a miss or a revalidation, and its HTTP client
//! implementation.

pub mod client;
pub mod error;

pub use client::{Fetcher, HttpFetcher, HttpFetcherConfig};
pub use error::ProxyError;
