//! Interval-driven metric summaries.
//!
//! The reporter owns a background task that logs a summary on every tick.
//! It must be stopped with [`MetricsReporter::shutdown`], which logs one
//! final summary before returning.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::TelemetryError;
use crate::metrics::CacheMetrics;
use crate::model::MetricsSnapshot;

pub struct MetricsReporter {
    metrics: Arc<CacheMetrics>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<u64>,
}

impl MetricsReporter {
    /// Start logging summaries of `metrics` every `interval`.
    pub fn start(metrics: Arc<CacheMetrics>, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task_metrics = metrics.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            ticker.tick().await;
            let mut reports = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        task_metrics.log_summary();
                        reports += 1;
                    }
                }
            }
            reports
        });
        debug!(interval_secs = interval.as_secs(), "Metrics reporter started");
        Self {
            metrics,
            stop: Some(stop),
            handle,
        }
    }

    /// Stop the background task and return the final snapshot.
    pub async fn shutdown(mut self) -> Result<MetricsSnapshot, TelemetryError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let reports = (&mut self.handle)
            .await
            .map_err(|e| TelemetryError::Reporter(e.to_string()))?;
        debug!(reports, "Metrics reporter stopped");
        self.metrics.log_summary();
        Ok(self.metrics.snapshot())
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
