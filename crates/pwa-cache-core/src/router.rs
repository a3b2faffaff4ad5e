//! Policy routing for intercepted requests
//!
//! Decides per request URL which caching policy applies. Matching is exact
//! string equality against the configured sets, checked in a fixed order.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::config::WorkerConfig;

/// Caching policy applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Serve from any partition, fall back to the network on a miss
    CacheFirst,
    /// Serve the runtime copy if there is one while refreshing it
    StaleWhileRevalidate,
    /// Not intercepted; the network handles it natively
    PassThrough,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::CacheFirst => "cache_first",
            Policy::StaleWhileRevalidate => "stale_while_revalidate",
            Policy::PassThrough => "pass_through",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy router
#[derive(Debug, Clone, Default)]
pub struct PolicyRouter {
    cache_first: HashSet<String>,
    revalidate: HashSet<String>,
}

impl PolicyRouter {
    pub fn new<C, R>(cache_first: C, revalidate: R) -> Self
    where
        C: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        Self {
            cache_first: cache_first.into_iter().collect(),
            revalidate: revalidate.into_iter().collect(),
        }
    }

    /// Route precached resources cache-first and the configured dynamic
    /// URLs stale-while-revalidate
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.precache.iter().cloned(),
            config.stale_while_revalidate.iter().cloned(),
        )
    }

    /// Classify a request URL
    ///
    /// Cache-first wins when a URL is in both sets.
    pub fn classify(&self, url: &str) -> Policy {
        if self.cache_first.contains(url) {
            Policy::CacheFirst
        } else if self.revalidate.contains(url) {
            Policy::StaleWhileRevalidate
        } else {
            Policy::PassThrough
        }
    }
}
