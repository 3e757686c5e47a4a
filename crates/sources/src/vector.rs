//! In-process vector knowledge base.
//!
//! Documents are embedded once on insert and ranked by cosine similarity at
//! query time. Embedding itself is an injected capability ([`Embedder`]);
//! [`HashingEmbedder`] is a dependency-free bag-of-words embedder good enough
//! for local corpora and tests.

use async_trait::async_trait;
use gatherline_core::{KnowledgeDocument, KnowledgeSearch, SourceError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SourceError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]. Mismatched lengths, empty input, or a zero
/// vector yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Feature-hashing embedder over lower-cased word tokens.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let index = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((index % self.dims as u64) as usize, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SourceError> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            let (i, sign) = self.bucket(&token.to_lowercase());
            vector[i] += sign;
        }
        Ok(vector)
    }
}

struct IndexedDocument {
    id: String,
    title: Option<String>,
    content: String,
    embedding: Vec<f32>,
}

pub struct VectorKnowledgeBase {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<IndexedDocument>>,
}

impl VectorKnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Embed and index a document, replacing any with the same id.
    pub async fn add_document(
        &self,
        id: impl Into<String>,
        title: Option<String>,
        content: impl Into<String>,
    ) -> Result<(), SourceError> {
        let id = id.into();
        let content = content.into();
        let embedding = self.embedder.embed(&content).await?;

        let mut documents = self.documents.write().await;
        documents.retain(|d| d.id != id);
        documents.push(IndexedDocument {
            id,
            title,
            content,
            embedding,
        });
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeSearch for VectorKnowledgeBase {
    fn name(&self) -> &str {
        "vector"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeDocument>, SourceError> {
        let query_embedding = self.embedder.embed(query).await?;
        let documents = self.documents.read().await;

        let mut scored: Vec<KnowledgeDocument> = documents
            .iter()
            .filter_map(|doc| {
                let similarity = cosine_similarity(&doc.embedding, &query_embedding);
                (similarity >= threshold).then(|| KnowledgeDocument {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    content: doc.content.clone(),
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
