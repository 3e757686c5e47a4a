//! Deep-research fetcher: an external research API, the slowest source.

use async_trait::async_trait;
use gatherline_cache::{CacheStore, derive_key};
use gatherline_config::SourcesConfig;
use gatherline_core::{FetchOptions, ResearchClient, SourceFetcher, SourceKind, SourceResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::DeadlineGuard;
use crate::envelope::ResearchEnvelope;
use crate::fetcher::CachedSource;

pub struct DeepResearchFetcher {
    client: Arc<dyn ResearchClient>,
    source: CachedSource,
}

impl DeepResearchFetcher {
    pub fn new(client: Arc<dyn ResearchClient>, store: Arc<CacheStore>, budget: Duration) -> Self {
        let guard = DeadlineGuard::new(SourceKind::DeepResearch.name(), budget);
        Self {
            client,
            source: CachedSource::new(SourceKind::DeepResearch, store, guard),
        }
    }

    pub fn from_config(
        client: Arc<dyn ResearchClient>,
        store: Arc<CacheStore>,
        config: &SourcesConfig,
    ) -> Self {
        Self::new(client, store, config.research_timeout())
    }

    pub fn with_guard(mut self, guard: DeadlineGuard) -> Self {
        self.source = CachedSource::new(SourceKind::DeepResearch, self.source.store().clone(), guard);
        self
    }
}

#[async_trait]
impl SourceFetcher for DeepResearchFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::DeepResearch
    }

    async fn fetch(&self, query: &str, options: &FetchOptions) -> SourceResult {
        let mut params = options.params.clone();
        params.insert("client".into(), json!(self.client.name()));
        let key = derive_key(query, &params);

        let client = self.client.clone();
        let query = query.to_string();

        self.source
            .fetch::<ResearchEnvelope, _>(&key, options, async move {
                let answer = client.research(&query).await?;
                if answer.content.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(ResearchEnvelope {
                    content: answer.content,
                    model: answer.model,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    query: Some(query),
                }))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherline_core::{
        CacheNamespace, CacheObserver, ResearchAnswer, SourceError, SourceOutcome, TIMEOUT_SENTINEL,
    };
    use serde_json::Map;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counts {
        hits: AtomicU64,
        misses: AtomicU64,
    }

    impl CacheObserver for Counts {
        fn on_hit(&self, _: CacheNamespace) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        fn on_miss(&self, _: CacheNamespace) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fn on_write(&self, _: CacheNamespace) {}
        fn on_error(&self, _: CacheNamespace) {}
    }

    struct Oracle {
        delay: Duration,
    }

    #[async_trait]
    impl ResearchClient for Oracle {
        fn name(&self) -> &str {
            "oracle"
        }

        async fn research(&self, query: &str) -> Result<ResearchAnswer, SourceError> {
            tokio::time::sleep(self.delay).await;
            Ok(ResearchAnswer {
                content: format!("Recent findings on {query}."),
                model: "sonar".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answer_is_cached_with_model() {
        let store = Arc::new(CacheStore::in_memory());
        let fetcher = DeepResearchFetcher::new(
            Arc::new(Oracle {
                delay: Duration::from_secs(3),
            }),
            store,
            Duration::from_secs(20),
        );

        let live = fetcher.fetch("EU battery regulation 2027", &FetchOptions::default()).await;
        assert_eq!(
            live.outcome,
            SourceOutcome::Live {
                content: "Recent findings on EU battery regulation 2027.".into()
            }
        );
        assert_eq!(live.elapsed_ms, 3_000);

        let cached = fetcher.fetch("eu battery regulation 2027", &FetchOptions::default()).await;
        assert!(cached.from_cache());
        assert_eq!(cached.elapsed_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_resolving_research_times_out_at_budget() {
        let fetcher = DeepResearchFetcher::new(
            Arc::new(Oracle {
                delay: Duration::from_secs(3_600),
            }),
            Arc::new(CacheStore::in_memory()),
            Duration::from_secs(20),
        );

        let result = fetcher.fetch("anything at all", &FetchOptions::default()).await;
        assert!(result.is_timeout());
        assert!(!result.from_cache());
        assert_eq!(result.content(), format!("Deep Research {TIMEOUT_SENTINEL} 20s"));
        assert_eq!(result.elapsed_ms, 20_000);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_without_model_counts_as_a_miss() {
        let counts = Arc::new(Counts::default());
        let store = Arc::new(CacheStore::in_memory().with_observer(counts.clone()));
        let mut params = Map::new();
        params.insert("client".into(), json!("oracle"));
        store
            .set(
                CacheNamespace::DeepSearch,
                &derive_key("battery recycling", &params),
                &json!({"content": "x", "model": "", "timestamp": 1}),
                None,
            )
            .await;

        let fetcher = DeepResearchFetcher::new(
            Arc::new(Oracle {
                delay: Duration::from_millis(10),
            }),
            store,
            Duration::from_secs(20),
        );
        let result = fetcher.fetch("battery recycling", &FetchOptions::default()).await;

        assert!(matches!(result.outcome, SourceOutcome::Live { .. }));
        assert_eq!(counts.hits.load(Ordering::Relaxed), 0);
        assert_eq!(counts.misses.load(Ordering::Relaxed), 1);
    }
}
