//! Which sources run for a turn.
//!
//! Sources are considered in strict priority order: knowledge base, then
//! scraping of URLs found in the query, then deep research. Research is
//! skipped only when *both* earlier sources already produced extensive
//! content.

use gatherline_config::TurnConfig;
use regex_lite::Regex;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttps?://[^\s<>"'`]+"#).ok());

/// Characters stripped from the end of a detected URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

/// Find http(s) URLs in free text, in order of appearance, without duplicates.
pub fn detect_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let Some(pattern) = URL_PATTERN.as_ref() else {
        return urls;
    };
    for found in pattern.find_iter(text) {
        let url = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if url.len() > "https://".len() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchDecision {
    Run,
    Skip { rag_chars: usize, scrape_chars: usize },
}

#[derive(Debug, Clone)]
pub struct RetrievalPolicy {
    pub min_query_chars: usize,
    pub rag_extensive_chars: usize,
    pub scrape_extensive_chars: usize,
    pub max_scrape_urls: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::from(&TurnConfig::default())
    }
}

impl From<&TurnConfig> for RetrievalPolicy {
    fn from(config: &TurnConfig) -> Self {
        Self {
            min_query_chars: config.min_query_chars,
            rag_extensive_chars: config.rag_extensive_chars,
            scrape_extensive_chars: config.scrape_extensive_chars,
            max_scrape_urls: config.max_scrape_urls,
        }
    }
}

impl RetrievalPolicy {
    pub fn should_query_knowledge_base(&self, query: &str) -> bool {
        query.trim().chars().count() >= self.min_query_chars
    }

    /// URLs to scrape for this query, capped at `max_scrape_urls`.
    pub fn urls_to_scrape(&self, query: &str) -> Vec<String> {
        let mut urls = detect_urls(query);
        urls.truncate(self.max_scrape_urls);
        urls
    }

    pub fn research_decision(&self, rag_chars: usize, scrape_chars: usize) -> ResearchDecision {
        let rag_extensive = rag_chars > self.rag_extensive_chars;
        let scrape_extensive = scrape_chars > self.scrape_extensive_chars;
        if rag_extensive && scrape_extensive {
            ResearchDecision::Skip {
                rag_chars,
                scrape_chars,
            }
        } else {
            ResearchDecision::Run
        }
    }
}
