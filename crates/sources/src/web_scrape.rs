//! Web scraper fetcher: page content for a URL the user shared.

use async_trait::async_trait;
use gatherline_cache::{CacheStore, derive_url_key};
use gatherline_config::SourcesConfig;
use gatherline_core::{FetchOptions, PageScraper, SourceFetcher, SourceKind, SourceResult};
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::DeadlineGuard;
use crate::envelope::ScrapeEnvelope;
use crate::fetcher::CachedSource;

/// Characters of page body kept in the context.
pub const DEFAULT_MAX_PAGE_CHARS: usize = 8_000;

pub struct WebScrapeFetcher {
    scraper: Arc<dyn PageScraper>,
    source: CachedSource,
    max_page_chars: usize,
}

impl WebScrapeFetcher {
    pub fn new(scraper: Arc<dyn PageScraper>, store: Arc<CacheStore>, budget: Duration) -> Self {
        let guard = DeadlineGuard::new(SourceKind::WebScraper.name(), budget);
        Self {
            scraper,
            source: CachedSource::new(SourceKind::WebScraper, store, guard),
            max_page_chars: DEFAULT_MAX_PAGE_CHARS,
        }
    }

    pub fn from_config(
        scraper: Arc<dyn PageScraper>,
        store: Arc<CacheStore>,
        config: &SourcesConfig,
    ) -> Self {
        Self::new(scraper, store, config.scrape_timeout())
    }

    pub fn with_max_page_chars(mut self, max_page_chars: usize) -> Self {
        self.max_page_chars = max_page_chars;
        self
    }

    pub fn with_guard(mut self, guard: DeadlineGuard) -> Self {
        self.source = CachedSource::new(SourceKind::WebScraper, self.source.store().clone(), guard);
        self
    }
}

#[async_trait]
impl SourceFetcher for WebScrapeFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::WebScraper
    }

    /// `query` is the URL to scrape.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> SourceResult {
        let url = url.trim().to_string();
        let key = derive_url_key(&url, &options.params);
        let scraper = self.scraper.clone();
        let max_chars = self.max_page_chars;

        self.source
            .fetch::<ScrapeEnvelope, _>(&key, options, async move {
                let page = scraper.scrape(&url).await?;
                if page.content.trim().is_empty() {
                    return Ok(None);
                }
                let content = if page.content.chars().count() > max_chars {
                    page.content.chars().take(max_chars).collect()
                } else {
                    page.content
                };
                Ok(Some(ScrapeEnvelope {
                    url: if page.url.is_empty() { url } else { page.url },
                    title: page.title,
                    description: page.description,
                    content,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                }))
            })
            .await
    }
}
