//! Source fetchers for gatherline.
//!
//! Every external retrieval goes through the same pipeline: derive a cache
//! key, try the [`CacheStore`](gatherline_cache::CacheStore), and on a miss run
//! the live call under a [`DeadlineGuard`]. Fetchers never fail; timeouts and
//! upstream errors come back as [`SourceOutcome`](gatherline_core::SourceOutcome)
//! variants.
//!
//! - [`deadline`]: race an operation against a timer
//! - [`envelope`]: typed, validated cache payloads per namespace
//! - [`KnowledgeBaseFetcher`], [`WebScrapeFetcher`], [`DeepResearchFetcher`]
//! - [`http`]: HTTP capability adapters
//! - [`vector`]: in-process vector knowledge base

pub mod deadline;
pub mod deep_research;
pub mod envelope;
pub mod fetcher;
pub mod http;
pub mod knowledge_base;
pub mod vector;
pub mod web_scrape;

pub use deadline::{DeadlineGuard, Raced, race};
pub use deep_research::DeepResearchFetcher;
pub use envelope::{Envelope, RagEnvelope, ResearchEnvelope, ScrapeEnvelope};
pub use fetcher::CachedSource;
pub use http::{ChatResearchClient, HttpKnowledgeSearch, HttpScraper};
pub use knowledge_base::{KnowledgeBaseFetcher, format_documents};
pub use vector::{Embedder, HashingEmbedder, VectorKnowledgeBase, cosine_similarity};
pub use web_scrape::WebScrapeFetcher;
