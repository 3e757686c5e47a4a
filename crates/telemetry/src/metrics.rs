//! Thread-safe cache and deadline counters.
//!
//! `CacheMetrics` is injected into the `CacheStore` as its observer and into
//! each Deadline Guard as a timeout hook. Every `report_every` cache
//! operations it logs a summary.

use chrono::Utc;
use gatherline_core::{CacheNamespace, CacheObserver};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::model::{MetricsSnapshot, NamespaceCounts};

const NAMESPACES: [CacheNamespace; 4] = [
    CacheNamespace::Rag,
    CacheNamespace::Scrape,
    CacheNamespace::DeepSearch,
    CacheNamespace::Ops,
];

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn load(&self) -> NamespaceCounts {
        NamespaceCounts {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

pub struct CacheMetrics {
    counters: [Counters; 4],
    timeouts: Mutex<BTreeMap<String, u64>>,
    operations: AtomicU64,
    report_every: u64,
}

impl CacheMetrics {
    /// `report_every == 0` disables operation-count summaries.
    pub fn new(report_every: u64) -> Self {
        Self {
            counters: Default::default(),
            timeouts: Mutex::new(BTreeMap::new()),
            operations: AtomicU64::new(0),
            report_every,
        }
    }

    fn counters(&self, namespace: CacheNamespace) -> &Counters {
        let index = NAMESPACES.iter().position(|ns| *ns == namespace).unwrap_or(0);
        &self.counters[index]
    }

    fn record(&self, namespace: CacheNamespace, pick: impl Fn(&Counters) -> &AtomicU64) {
        pick(self.counters(namespace)).fetch_add(1, Ordering::Relaxed);
        let ops = self.operations.fetch_add(1, Ordering::Relaxed) + 1;
        if self.report_every > 0 && ops % self.report_every == 0 {
            self.log_summary();
        }
    }

    /// Count a Deadline Guard timeout for a source.
    pub fn record_timeout(&self, source: &str) {
        if let Ok(mut timeouts) = self.timeouts.lock() {
            *timeouts.entry(source.to_string()).or_insert(0) += 1;
        }
    }

    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timeouts = self
            .timeouts
            .lock()
            .map(|t| t.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        MetricsSnapshot {
            taken_at: Utc::now(),
            namespaces: NAMESPACES
                .iter()
                .map(|ns| (*ns, self.counters(*ns).load()))
                .collect(),
            timeouts,
        }
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        let totals = snapshot.totals();
        info!(
            hits = totals.hits,
            misses = totals.misses,
            writes = totals.writes,
            errors = totals.errors,
            hit_rate = format!("{:.1}%", totals.hit_rate() * 100.0),
            timeouts = snapshot.total_timeouts(),
            "Cache summary: {snapshot}"
        );
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

impl CacheObserver for CacheMetrics {
    fn on_hit(&self, namespace: CacheNamespace) {
        self.record(namespace, |c| &c.hits);
    }

    fn on_miss(&self, namespace: CacheNamespace) {
        self.record(namespace, |c| &c.misses);
    }

    fn on_write(&self, namespace: CacheNamespace) {
        self.record(namespace, |c| &c.writes);
    }

    fn on_error(&self, namespace: CacheNamespace) {
        self.record(namespace, |c| &c.errors);
    }
}
