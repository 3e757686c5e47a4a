//! Knowledge-base fetcher: similarity search over internal documents.

use async_trait::async_trait;
use gatherline_cache::{CacheStore, derive_key};
use gatherline_config::SourcesConfig;
use gatherline_core::{
    FetchOptions, KnowledgeDocument, KnowledgeSearch, SourceFetcher, SourceKind, SourceResult,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::DeadlineGuard;
use crate::envelope::RagEnvelope;
use crate::fetcher::CachedSource;

/// Characters of each document kept in the rendered context.
pub const DEFAULT_MAX_DOC_CHARS: usize = 2_000;

pub struct KnowledgeBaseFetcher {
    search: Arc<dyn KnowledgeSearch>,
    source: CachedSource,
    match_count: usize,
    threshold: f32,
    max_doc_chars: usize,
}

impl KnowledgeBaseFetcher {
    pub fn new(search: Arc<dyn KnowledgeSearch>, store: Arc<CacheStore>, budget: Duration) -> Self {
        let guard = DeadlineGuard::new(SourceKind::KnowledgeBase.name(), budget);
        Self {
            search,
            source: CachedSource::new(SourceKind::KnowledgeBase, store, guard),
            match_count: 5,
            threshold: 0.5,
            max_doc_chars: DEFAULT_MAX_DOC_CHARS,
        }
    }

    pub fn from_config(
        search: Arc<dyn KnowledgeSearch>,
        store: Arc<CacheStore>,
        config: &SourcesConfig,
    ) -> Self {
        Self::new(search, store, config.knowledge_timeout())
            .with_match_count(config.knowledge_match_count)
            .with_threshold(config.knowledge_threshold)
    }

    pub fn with_match_count(mut self, match_count: usize) -> Self {
        self.match_count = match_count.max(1);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_doc_chars(mut self, max_doc_chars: usize) -> Self {
        self.max_doc_chars = max_doc_chars;
        self
    }

    /// Replace the deadline guard (e.g. to attach a timeout hook).
    pub fn with_guard(mut self, guard: DeadlineGuard) -> Self {
        self.source = CachedSource::new(
            SourceKind::KnowledgeBase,
            self.source.store().clone(),
            guard,
        );
        self
    }
}

#[async_trait]
impl SourceFetcher for KnowledgeBaseFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::KnowledgeBase
    }

    async fn fetch(&self, query: &str, options: &FetchOptions) -> SourceResult {
        let mut params = options.params.clone();
        params.insert("limit".into(), json!(self.match_count));
        params.insert("threshold".into(), json!(self.threshold));
        let key = derive_key(query, &params);

        let search = self.search.clone();
        let query = query.to_string();
        let (limit, threshold, max_chars) = (self.match_count, self.threshold, self.max_doc_chars);

        self.source
            .fetch::<RagEnvelope, _>(&key, options, async move {
                let docs = search.search(&query, limit, threshold).await?;
                if docs.is_empty() {
                    return Ok(None);
                }
                Ok(Some(RagEnvelope::Rendered {
                    content: format_documents(&docs, max_chars),
                    retrieved_count: u32::try_from(docs.len()).ok(),
                }))
            })
            .await
    }
}

fn percent(similarity: f32) -> u32 {
    (similarity.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Render documents as a numbered list with per-document and average
/// similarity, truncating each body to `max_chars`.
pub fn format_documents(docs: &[KnowledgeDocument], max_chars: usize) -> String {
    if docs.is_empty() {
        return String::new();
    }

    let average = docs.iter().map(|d| d.similarity).sum::<f32>() / docs.len() as f32;
    let noun = if docs.len() == 1 { "document" } else { "documents" };
    let mut out = format!(
        "Found {} relevant {noun} in the knowledge base (average similarity {}%):\n",
        docs.len(),
        percent(average)
    );

    for (i, doc) in docs.iter().enumerate() {
        let title = doc.title.as_deref().unwrap_or(&doc.id);
        out.push_str(&format!(
            "\n[{}] {title} (similarity {}%)\n",
            i + 1,
            percent(doc.similarity)
        ));
        let body = doc.content.trim();
        if body.chars().count() > max_chars {
            out.extend(body.chars().take(max_chars));
            out.push_str("...");
        } else {
            out.push_str(body);
        }
        out.push('\n');
    }
    out
}
