//! HTTP adapters for the three retrieval capabilities.
//!
//! - [`HttpKnowledgeSearch`]: a similarity-search endpoint (`POST {query, matchCount, matchThreshold}`)
//! - [`HttpScraper`]: the scraping microservice (`POST {url}`)
//! - [`ChatResearchClient`]: any OpenAI-compatible `/chat/completions`
//!   endpoint with web-grounded models (Perplexity by default)
//!
//! None of these apply their own retry policy; the fetchers' deadlines bound
//! every call.

use async_trait::async_trait;
use gatherline_config::SourcesConfig;
use gatherline_core::{
    KnowledgeDocument, KnowledgeSearch, PageScraper, ResearchAnswer, ResearchClient, ScrapedPage,
    SourceError,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Transport timeout; the per-source deadline normally fires first.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| SourceError::Network(format!("failed to build HTTP client: {e}")))
}

/// Send a prepared request and decode a JSON body, mapping every failure
/// onto [`SourceError`].
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Upstream returned error");
        return Err(SourceError::Upstream {
            status,
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SourceError::InvalidResponse(format!("failed to parse response: {e}")))
}

// ── Knowledge search ─────────────────────────────────────────────────────

pub struct HttpKnowledgeSearch {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchReply {
    Wrapped { documents: Vec<KnowledgeDocument> },
    Bare(Vec<KnowledgeDocument>),
}

impl HttpKnowledgeSearch {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl KnowledgeSearch for HttpKnowledgeSearch {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeDocument>, SourceError> {
        debug!(endpoint = %self.endpoint, limit, "Knowledge search request");
        let body = serde_json::json!({
            "query": query,
            "matchCount": limit,
            "matchThreshold": threshold,
        });
        let reply: SearchReply = send_json(self.client.post(&self.endpoint).json(&body)).await?;
        let mut docs = match reply {
            SearchReply::Wrapped { documents } => documents,
            SearchReply::Bare(documents) => documents,
        };
        docs.retain(|d| d.similarity >= threshold && !d.content.trim().is_empty());
        docs.truncate(limit);
        Ok(docs)
    }
}

// ── Scraper ──────────────────────────────────────────────────────────────

pub struct HttpScraper {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ScrapeReply {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    error: Option<String>,
}

impl HttpScraper {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client()?,
        })
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    fn name(&self) -> &str {
        "http"
    }

    async fn scrape(&self, url: &str) -> Result<ScrapedPage, SourceError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SourceError::InvalidResponse(format!(
                "not an http(s) URL: {url}"
            )));
        }

        debug!(endpoint = %self.endpoint, url, "Scrape request");
        let body = serde_json::json!({ "url": url });
        let reply: ScrapeReply = send_json(self.client.post(&self.endpoint).json(&body)).await?;
        if let Some(error) = reply.error {
            return Err(SourceError::InvalidResponse(error));
        }

        Ok(ScrapedPage {
            url: if reply.url.is_empty() {
                url.to_string()
            } else {
                reply.url
            },
            title: reply.title,
            description: reply.description,
            content: reply.content,
        })
    }
}

// ── Research ─────────────────────────────────────────────────────────────

const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant. Answer with current, \
    well-sourced facts. Be concise and cite sources inline where possible.";

pub struct ChatResearchClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResearchClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: build_client()?,
        })
    }

    /// Build from configuration. Fails if no API key is configured.
    pub fn from_config(config: &SourcesConfig) -> Result<Self, SourceError> {
        let api_key = config
            .research_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SourceError::NotConfigured("research API key".into()))?;
        Self::new(&config.research_url, api_key, &config.research_model)
    }

    fn parse(reply: ChatResponse, fallback_model: &str) -> Result<ResearchAnswer, SourceError> {
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SourceError::InvalidResponse("no choices in response".into()))?;
        Ok(ResearchAnswer {
            content,
            model: reply.model.unwrap_or_else(|| fallback_model.to_string()),
        })
    }
}

#[async_trait]
impl ResearchClient for ChatResearchClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn research(&self, query: &str) -> Result<ResearchAnswer, SourceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": RESEARCH_SYSTEM_PROMPT },
                { "role": "user", "content": query },
            ],
            "stream": false,
        });

        debug!(model = %self.model, "Research request");
        let reply: ChatResponse =
            send_json(self.client.post(&url).bearer_auth(&self.api_key).json(&body)).await?;
        Self::parse(reply, &self.model)
    }
}
