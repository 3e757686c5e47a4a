//! Cache-backed mutual exclusion and fixed-window rate limiting.
//!
//! Both live in the `ops` namespace and work identically on either backend.

use gatherline_core::CacheNamespace;
use gatherline_core::error::CacheError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::CacheStore;

/// A named lock with an expiry, so a crashed holder cannot wedge it forever.
pub struct CacheLock {
    store: Arc<CacheStore>,
    ttl: Duration,
}

/// Proof of holding a lock. Pass it back to [`CacheLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    name: String,
    token: String,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CacheLock {
    pub fn new(store: Arc<CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(name: &str) -> String {
        format!("lock:{name}")
    }

    /// Try to take the lock. `Ok(None)` means someone else holds it.
    pub async fn acquire(&self, name: &str) -> Result<Option<LockGuard>, CacheError> {
        let token = uuid::Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_if_absent(CacheNamespace::Ops, &Self::key(name), &token, self.ttl)
            .await?;

        if acquired {
            debug!(lock = name, "Lock acquired");
            Ok(Some(LockGuard {
                name: name.to_string(),
                token,
            }))
        } else {
            debug!(lock = name, "Lock held elsewhere");
            Ok(None)
        }
    }

    /// Release a held lock. A lock that has since expired and been taken by
    /// another holder is left alone.
    ///
    /// The compare and the delete are two commands, so a holder whose lock
    /// expires in between can still remove the next holder's entry.
    pub async fn release(&self, guard: LockGuard) {
        let key = Self::key(&guard.name);
        let current: Option<String> = self.store.get(CacheNamespace::Ops, &key).await;
        match current {
            Some(token) if token == guard.token => {
                self.store.delete(CacheNamespace::Ops, &key).await;
                debug!(lock = %guard.name, "Lock released");
            }
            Some(_) => warn!(lock = %guard.name, "Lock expired and was re-acquired before release"),
            None => debug!(lock = %guard.name, "Lock already expired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: i64 },
    Limited { count: i64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// At most `limit` events per fixed window. The window starts with the
/// first event counted in it.
pub struct RateLimiter {
    store: Arc<CacheStore>,
    limit: i64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<CacheStore>, limit: i64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    /// Count one event against `bucket` and report whether it is allowed.
    pub async fn check(&self, bucket: &str) -> Result<RateDecision, CacheError> {
        let count = self
            .store
            .incr(CacheNamespace::Ops, &format!("rate:{bucket}"), self.window)
            .await?;

        if count > self.limit {
            debug!(bucket, count, limit = self.limit, "Rate limit exceeded");
            Ok(RateDecision::Limited { count })
        } else {
            Ok(RateDecision::Allowed { count })
        }
    }
}
