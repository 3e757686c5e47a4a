//! The shared cache → deadline → live-fetch pipeline every source runs.

use gatherline_cache::CacheStore;
use gatherline_core::{FetchOptions, SourceError, SourceKind, SourceOutcome, SourceResult};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::deadline::{DeadlineGuard, Raced};
use crate::envelope::Envelope;

/// One source's cache handle and deadline.
#[derive(Clone)]
pub struct CachedSource {
    kind: SourceKind,
    store: Arc<CacheStore>,
    guard: DeadlineGuard,
}

impl CachedSource {
    pub fn new(kind: SourceKind, store: Arc<CacheStore>, guard: DeadlineGuard) -> Self {
        Self { kind, store, guard }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn guard(&self) -> &DeadlineGuard {
        &self.guard
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Serve `key` from cache, or run `live` under the deadline and cache a
    /// valid result. Never fails: every failure mode is a [`SourceOutcome`].
    pub async fn fetch<E, Fut>(&self, key: &str, options: &FetchOptions, live: Fut) -> SourceResult
    where
        E: Envelope,
        Fut: Future<Output = Result<Option<E>, SourceError>> + Send + 'static,
    {
        let started = Instant::now();
        let namespace = E::NAMESPACE;

        if !options.bypass_cache {
            if let Some(cached) = self.store.get_where(namespace, key, E::is_valid).await {
                debug!(source = %self.kind, key, "Cache hit");
                return self.result(
                    SourceOutcome::CacheHit {
                        content: cached.content(),
                    },
                    started,
                );
            }
        }

        let outcome = match self.guard.run(live).await {
            Raced::Settled(Ok(Some(envelope))) if envelope.is_valid() => {
                self.store.set(namespace, key, &envelope, options.ttl).await;
                SourceOutcome::Live {
                    content: envelope.content(),
                }
            }
            Raced::Settled(Ok(_)) => {
                info!(source = %self.kind, "No usable result");
                SourceOutcome::Empty
            }
            Raced::Settled(Err(e)) => {
                warn!(source = %self.kind, error = %e, "Source fetch failed");
                SourceOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Raced::TimedOut => SourceOutcome::TimedOut {
                budget_ms: self.guard.budget_ms(),
            },
            Raced::Aborted(reason) => SourceOutcome::Failed { reason },
        };

        self.result(outcome, started)
    }

    fn result(&self, outcome: SourceOutcome, started: Instant) -> SourceResult {
        SourceResult::new(self.kind, outcome).with_elapsed(started.elapsed())
    }
}
