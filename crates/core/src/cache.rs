//! Cache trait: the abstraction over the shared key/value store.
//!
//! The cache is the only resource shared across concurrent turns. Backends
//! store native JSON values under fully-qualified string keys and honour a
//! per-entry TTL. The `CacheStore` facade in `gatherline-cache` adds
//! namespacing, error swallowing, and fallback on top of this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CacheError;

/// A logical partition of the cache keyspace, each with its own default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Knowledge-base search results.
    Rag,
    /// Scraped web pages.
    Scrape,
    /// Deep-research answers.
    #[serde(rename = "deepsearch")]
    DeepSearch,
    /// Short-lived operational entries (locks, rate-limit counters, probes).
    Ops,
}

impl CacheNamespace {
    /// The key segment for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Scrape => "scrape",
            Self::DeepSearch => "deepsearch",
            Self::Ops => "ops",
        }
    }

    /// Built-in default TTL; configuration may override it.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Rag => Duration::from_secs(12 * 60 * 60),
            Self::Scrape => Duration::from_secs(6 * 60 * 60),
            Self::DeepSearch | Self::Ops => Duration::from_secs(60 * 60),
        }
    }

    /// Parse a namespace from its key segment.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rag" => Some(Self::Rag),
            "scrape" => Some(Self::Scrape),
            "deepsearch" => Some(Self::DeepSearch),
            "ops" => Some(Self::Ops),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The core CacheBackend trait.
///
/// Implementations: REST (networked, Upstash-compatible), in-memory (fallback
/// and tests). Keys passed here are already fully qualified.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// The backend name (e.g., "rest", "in_memory").
    fn name(&self) -> &str;

    /// Read a stored value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> std::result::Result<Option<serde_json::Value>, CacheError>;

    /// Store a value, replacing any previous entry.
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> std::result::Result<(), CacheError>;

    /// Store a value only if the key is absent. Returns whether it was stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> std::result::Result<bool, CacheError>;

    /// Atomically increment an integer counter. The TTL is applied when the
    /// increment creates the counter, or when the counter has none; a running
    /// TTL is never extended.
    async fn incr(&self, key: &str, ttl: Duration) -> std::result::Result<i64, CacheError>;

    /// Whether a live entry exists for the key.
    async fn exists(&self, key: &str) -> std::result::Result<bool, CacheError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> std::result::Result<(), CacheError>;
}

/// Observer for cache statistics, injected into the cache facade.
pub trait CacheObserver: Send + Sync {
    fn on_hit(&self, namespace: CacheNamespace);
    fn on_miss(&self, namespace: CacheNamespace);
    fn on_write(&self, namespace: CacheNamespace);
    fn on_error(&self, namespace: CacheNamespace);
}

/// An observer that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {
    fn on_hit(&self, _namespace: CacheNamespace) {}
    fn on_miss(&self, _namespace: CacheNamespace) {}
    fn on_write(&self, _namespace: CacheNamespace) {}
    fn on_error(&self, _namespace: CacheNamespace) {}
}
