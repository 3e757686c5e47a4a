//! Typed cache envelopes, one per namespace.
//!
//! A cached value is trusted only if it deserializes into its namespace's
//! envelope *and* passes [`Envelope::is_valid`]. Anything else is a miss.

use gatherline_core::{CacheNamespace, KnowledgeDocument};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The stored form of one source's result.
pub trait Envelope: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAMESPACE: CacheNamespace;

    /// Required fields carry usable data.
    fn is_valid(&self) -> bool;

    /// Text handed to the Tool Manager.
    fn content(&self) -> String;
}

/// Knowledge-base results: a rendered envelope, or the raw documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RagEnvelope {
    Rendered {
        content: String,
        #[serde(rename = "retrievedCount", default, skip_serializing_if = "Option::is_none")]
        retrieved_count: Option<u32>,
    },
    Documents(Vec<KnowledgeDocument>),
}

impl Envelope for RagEnvelope {
    const NAMESPACE: CacheNamespace = CacheNamespace::Rag;

    fn is_valid(&self) -> bool {
        match self {
            Self::Rendered { content, .. } => !content.trim().is_empty(),
            Self::Documents(docs) => !docs.is_empty(),
        }
    }

    fn content(&self) -> String {
        match self {
            Self::Rendered { content, .. } => content.clone(),
            Self::Documents(docs) => crate::knowledge_base::format_documents(docs, usize::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeEnvelope {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Envelope for ScrapeEnvelope {
    const NAMESPACE: CacheNamespace = CacheNamespace::Scrape;

    fn is_valid(&self) -> bool {
        !self.url.trim().is_empty() && !self.content.trim().is_empty()
    }

    fn content(&self) -> String {
        let title = if self.title.trim().is_empty() {
            self.url.as_str()
        } else {
            self.title.as_str()
        };
        let mut out = format!("Content from {title} ({}):\n", self.url);
        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            out.push_str(description.trim());
            out.push_str("\n\n");
        }
        out.push_str(self.content.trim());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchEnvelope {
    pub content: String,
    pub model: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Envelope for ResearchEnvelope {
    const NAMESPACE: CacheNamespace = CacheNamespace::DeepSearch;

    fn is_valid(&self) -> bool {
        !self.content.trim().is_empty() && !self.model.trim().is_empty()
    }

    fn content(&self) -> String {
        self.content.clone()
    }
}
