//! Data model for metric snapshots.

use chrono::{DateTime, Utc};
use gatherline_core::CacheNamespace;
use serde::{Deserialize, Serialize};

/// Counters for one cache namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceCounts {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl NamespaceCounts {
    /// Reads served (hits + misses).
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups that hit, or 0.0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    fn add(&mut self, other: &NamespaceCounts) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.writes += other.writes;
        self.errors += other.errors;
    }
}

/// A point-in-time copy of all counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub namespaces: Vec<(CacheNamespace, NamespaceCounts)>,
    /// Deadline Guard timeouts, per source label.
    pub timeouts: Vec<(String, u64)>,
}

impl MetricsSnapshot {
    pub fn totals(&self) -> NamespaceCounts {
        let mut total = NamespaceCounts::default();
        for (_, counts) in &self.namespaces {
            total.add(counts);
        }
        total
    }

    pub fn for_namespace(&self, namespace: CacheNamespace) -> NamespaceCounts {
        self.namespaces
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, c)| *c)
            .unwrap_or_default()
    }

    pub fn total_timeouts(&self) -> u64 {
        self.timeouts.iter().map(|(_, n)| n).sum()
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.totals();
        write!(
            f,
            "{} hits / {} misses ({:.1}% hit rate), {} writes, {} errors",
            total.hits,
            total.misses,
            total.hit_rate() * 100.0,
            total.writes,
            total.errors
        )?;
        for (ns, counts) in &self.namespaces {
            if counts.lookups() + counts.writes + counts.errors > 0 {
                write!(f, "; {ns}: {}/{}", counts.hits, counts.lookups())?;
            }
        }
        if self.total_timeouts() > 0 {
            write!(f, "; {} timeouts", self.total_timeouts())?;
        }
        Ok(())
    }
}
