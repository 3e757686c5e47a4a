pub mod ask;
pub mod config_cmd;
pub mod doctor;
pub mod inspect;
pub mod key;

use gatherline_cache::CacheStore;
use gatherline_config::AppConfig;
use gatherline_telemetry::CacheMetrics;
use std::sync::Arc;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Connect the shared cache store with metrics attached.
pub async fn open_store(config: &AppConfig) -> (Arc<CacheStore>, Arc<CacheMetrics>) {
    let metrics = Arc::new(CacheMetrics::new(config.cache.report_every));
    let store = CacheStore::connect(&config.cache)
        .await
        .with_observer(metrics.clone());
    (Arc::new(store), metrics)
}
