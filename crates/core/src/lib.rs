//! # Gatherline Core
//!
//! Domain types, traits, and error definitions for the gatherline retrieval
//! orchestrator. This crate has **no I/O of its own**; it defines the model
//! that the cache, source, and orchestrator crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`CacheBackend`] for the networked or in-process key/value store
//! - [`KnowledgeSearch`], [`PageScraper`], [`ResearchClient`] for the three
//!   retrieval capabilities
//! - [`SourceFetcher`] for the cache-aware, deadline-bound wrappers around them
//! - [`Clock`] so TTL behaviour can be simulated in tests

pub mod cache;
pub mod clock;
pub mod error;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheBackend, CacheNamespace, CacheObserver, NoopObserver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Error, Result, SourceError};
pub use source::{
    FetchOptions, KnowledgeDocument, KnowledgeSearch, PageScraper, ResearchAnswer, ResearchClient,
    ScrapedPage, SourceFetcher, SourceKind, SourceOutcome, SourceResult, TIMEOUT_SENTINEL,
};
