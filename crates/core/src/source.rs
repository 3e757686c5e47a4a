//! Source model: what a retrieval source returns and the capabilities behind it.
//!
//! Three capabilities feed a chat turn: an internal knowledge base, a web
//! page scraper, and an external deep-research API. Each is wrapped by a
//! [`SourceFetcher`] that adds caching and a deadline, and always yields a
//! [`SourceResult`] rather than an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::CacheNamespace;
use crate::error::SourceError;

/// Marker phrase carried by the rendered content of a timed-out source.
pub const TIMEOUT_SENTINEL: &str = "timed out after";

/// The kinds of source a turn can draw on, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    KnowledgeBase,
    WebScraper,
    DeepResearch,
}

impl SourceKind {
    /// All kinds, highest priority first.
    pub const ALL: [SourceKind; 3] = [Self::KnowledgeBase, Self::WebScraper, Self::DeepResearch];

    /// Canonical source name used for registration and attribution.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KnowledgeBase => "Knowledge Base",
            Self::WebScraper => "Web Scraper",
            Self::DeepResearch => "Deep Research",
        }
    }

    /// Resolve a canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// The cache namespace this source's results live in.
    pub fn namespace(&self) -> CacheNamespace {
        match self {
            Self::KnowledgeBase => CacheNamespace::Rag,
            Self::WebScraper => CacheNamespace::Scrape,
            Self::DeepResearch => CacheNamespace::DeepSearch,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a single fetch settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// A valid cached envelope was found.
    CacheHit { content: String },
    /// The live capability answered within its deadline.
    Live { content: String },
    /// The capability answered, but with nothing usable.
    Empty,
    /// The deadline fired before the capability answered.
    TimedOut { budget_ms: u64 },
    /// The capability failed; the reason is explanatory only.
    Failed { reason: String },
}

/// The result of one fetch, owned by the turn once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: SourceKind,
    pub outcome: SourceOutcome,
    pub retrieved_at: DateTime<Utc>,
    /// Wall time spent inside the fetcher.
    pub elapsed_ms: u64,
}

impl SourceResult {
    pub fn new(source: SourceKind, outcome: SourceOutcome) -> Self {
        Self {
            source,
            outcome,
            retrieved_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    /// Record how long the fetch took.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn from_cache(&self) -> bool {
        matches!(self.outcome, SourceOutcome::CacheHit { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, SourceOutcome::TimedOut { .. })
    }

    /// Content suitable for registration: present only for cache hits and
    /// live successes with non-blank text.
    pub fn usable_content(&self) -> Option<&str> {
        match &self.outcome {
            SourceOutcome::CacheHit { content } | SourceOutcome::Live { content }
                if !content.trim().is_empty() =>
            {
                Some(content.as_str())
            }
            _ => None,
        }
    }

    /// Human-readable content, including explanatory text for the
    /// timeout and failure variants.
    pub fn content(&self) -> String {
        match &self.outcome {
            SourceOutcome::CacheHit { content } | SourceOutcome::Live { content } => {
                content.clone()
            }
            SourceOutcome::Empty => String::new(),
            SourceOutcome::TimedOut { budget_ms } => format!(
                "{} {TIMEOUT_SENTINEL} {}",
                self.source.name(),
                format_budget(*budget_ms)
            ),
            SourceOutcome::Failed { reason } => {
                format!("{} unavailable: {reason}", self.source.name())
            }
        }
    }
}

fn format_budget(budget_ms: u64) -> String {
    if budget_ms % 1000 == 0 {
        format!("{}s", budget_ms / 1000)
    } else {
        format!("{:.1}s", budget_ms as f64 / 1000.0)
    }
}

/// Per-call fetch options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Overrides the namespace TTL for the write-back.
    pub ttl: Option<Duration>,
    /// Skip the cache lookup (the live result is still written back).
    pub bypass_cache: bool,
    /// Extra request parameters; they take part in the cache key.
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl FetchOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────

/// A document returned by a knowledge-base similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
}

/// A scraped web page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
}

/// An answer from the research API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchAnswer {
    pub content: String,
    pub model: String,
}

/// Vector similarity search over the internal knowledge base.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> std::result::Result<Vec<KnowledgeDocument>, SourceError>;
}

/// Fetches and extracts the readable content of a web page.
#[async_trait]
pub trait PageScraper: Send + Sync {
    fn name(&self) -> &str;

    async fn scrape(&self, url: &str) -> std::result::Result<ScrapedPage, SourceError>;
}

/// An external research API answering free-text questions.
#[async_trait]
pub trait ResearchClient: Send + Sync {
    fn name(&self) -> &str;

    async fn research(&self, query: &str) -> std::result::Result<ResearchAnswer, SourceError>;
}

/// A cache-aware, deadline-bound wrapper around one capability.
///
/// `fetch` never fails: expected failure modes become [`SourceOutcome`]
/// variants.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, query: &str, options: &FetchOptions) -> SourceResult;
}
