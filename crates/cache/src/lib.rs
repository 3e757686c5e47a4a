//! Cache system for gatherline.
//!
//! - [`key`]: deterministic, order-independent cache key derivation
//! - [`InMemoryBackend`]: process-local store with lazy TTL expiry
//! - [`RestBackend`]: networked store speaking the Upstash REST protocol
//! - [`CacheStore`]: the namespaced facade every caller goes through; it
//!   probes the networked backend at startup and falls back to memory
//! - [`lock`]: cache-backed mutual exclusion and rate limiting
//! - [`inspect`]: read-only diagnostics for a stored key

pub mod in_memory;
pub mod inspect;
pub mod key;
pub mod lock;
pub mod rest;
pub mod store;

pub use in_memory::InMemoryBackend;
pub use inspect::CacheInspection;
pub use key::{CacheKey, derive_key, derive_url_key, hash_semantic, normalize_query, stable_stringify};
pub use lock::{CacheLock, LockGuard, RateDecision, RateLimiter};
pub use rest::RestBackend;
pub use store::CacheStore;
