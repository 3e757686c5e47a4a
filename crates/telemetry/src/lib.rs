//! Cache and deadline metrics for gatherline.
//!
//! [`CacheMetrics`] counts hits, misses, writes and errors per cache
//! namespace plus Deadline Guard timeouts per source, and logs a summary
//! every N operations. [`MetricsReporter`] adds a time-based summary and is
//! stopped explicitly at shutdown.

pub mod metrics;
pub mod model;
pub mod reporter;

pub use metrics::CacheMetrics;
pub use model::{MetricsSnapshot, NamespaceCounts};
pub use reporter::MetricsReporter;

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("metrics reporter failed: {0}")]
    Reporter(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
