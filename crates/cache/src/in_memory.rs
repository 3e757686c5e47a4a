//! In-memory backend: the fallback store, also used for testing.
//!
//! Expiry is lazy: an entry past its deadline is dropped when it is next
//! read, never by a background sweep. No lock is held across an await point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatherline_core::error::CacheError;
use gatherline_core::{CacheBackend, Clock, SystemClock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

struct Slot {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A map-based store with the same TTL semantics as the networked backend.
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use an injected clock (e.g. `ManualClock` in tests).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn deadline(&self, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl?).ok()?;
        self.clock.now().checked_add_signed(ttl)
    }

    /// Number of entries currently held, including expired ones not yet read.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it, unless a writer replaced it in the meantime.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|slot| !slot.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let slot = Slot {
            value,
            expires_at: self.deadline(ttl),
        };
        self.entries.write().await.insert(key.to_string(), slot);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let expires_at = self.deadline(Some(ttl));
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|slot| slot.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Slot { value, expires_at });
        Ok(true)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = self.clock.now();
        let expires_at = self.deadline(Some(ttl));
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(slot) if slot.is_live(now) => {
                let current = slot.value.as_i64().ok_or_else(|| {
                    CacheError::Command(format!("value at '{key}' is not an integer"))
                })?;
                let next = current.saturating_add(1);
                slot.value = Value::from(next);
                if slot.expires_at.is_none() {
                    slot.expires_at = expires_at;
                }
                Ok(next)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Slot {
                        value: Value::from(1),
                        expires_at,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherline_core::ManualClock;
    use serde_json::json;

    fn backend_with_clock() -> (InMemoryBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (InMemoryBackend::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn set_then_get() {
        let (mem, _) = backend_with_clock();
        mem.set("rag:abc", json!({"content": "hello"}), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(
            mem.get("rag:abc").await.unwrap(),
            Some(json!({"content": "hello"}))
        );
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing_and_are_dropped() {
        let (mem, clock) = backend_with_clock();
        mem.set("rag:abc", json!("v"), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(59));
        assert!(mem.exists("rag:abc").await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert_eq!(mem.get("rag:abc").await.unwrap(), None);
        assert!(mem.is_empty().await);
    }

    #[tokio::test]
    async fn entries_without_ttl_never_expire() {
        let (mem, clock) = backend_with_clock();
        mem.set("ops:k", json!(1), None).await.unwrap();
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(mem.exists("ops:k").await.unwrap());
    }

    #[tokio::test]
    async fn set_if_absent_respects_live_entries_only() {
        let (mem, clock) = backend_with_clock();
        let ttl = Duration::from_secs(30);
        assert!(mem.set_if_absent("ops:lock", json!("a"), ttl).await.unwrap());
        assert!(!mem.set_if_absent("ops:lock", json!("b"), ttl).await.unwrap());

        clock.advance(Duration::from_secs(31));
        assert!(mem.set_if_absent("ops:lock", json!("c"), ttl).await.unwrap());
        assert_eq!(mem.get("ops:lock").await.unwrap(), Some(json!("c")));
    }

    #[tokio::test]
    async fn incr_sets_ttl_only_on_creation() {
        let (mem, clock) = backend_with_clock();
        let window = Duration::from_secs(60);
        assert_eq!(mem.incr("ops:rate", window).await.unwrap(), 1);
        clock.advance(Duration::from_secs(40));
        assert_eq!(mem.incr("ops:rate", window).await.unwrap(), 2);

        // The window started at the first increment, not the second.
        clock.advance(Duration::from_secs(21));
        assert_eq!(mem.incr("ops:rate", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn counter_without_ttl_gets_one_on_increment() {
        let (mem, clock) = backend_with_clock();
        mem.set("ops:rate", json!(4), None).await.unwrap();
        assert_eq!(mem.incr("ops:rate", Duration::from_secs(60)).await.unwrap(), 5);

        clock.advance(Duration::from_secs(61));
        assert!(!mem.exists("ops:rate").await.unwrap());
    }

    #[tokio::test]
    async fn incr_on_non_integer_is_an_error() {
        let (mem, _) = backend_with_clock();
        mem.set("ops:k", json!("text"), None).await.unwrap();
        assert!(matches!(
            mem.incr("ops:k", Duration::from_secs(1)).await,
            Err(CacheError::Command(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_key_is_ok() {
        let mem = InMemoryBackend::new();
        assert!(mem.delete("nope").await.is_ok());
    }
}
