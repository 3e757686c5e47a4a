//! The per-turn retrieval orchestrator.
//!
//! One call to [`Orchestrator::run_turn`] gathers context for one chat turn:
//!
//! 1. Knowledge base, if the query is long enough
//! 2. Web scraper, for each URL detected in the query (up to a cap)
//! 3. Deep research, if requested and the earlier sources are not both
//!    already extensive
//!
//! Sources run strictly in that order, each awaited before the next decision.
//! The whole gather runs under an outer deadline; when it fires, in-flight
//! work is abandoned, the turn's [`ToolManager`] is frozen, and a
//! [`TurnOutcome::TimedOut`] is returned with whatever had been gathered.

use gatherline_config::AppConfig;
use gatherline_core::{Error, FetchOptions, Result, SourceFetcher, SourceKind, SourceResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy::{ResearchDecision, RetrievalPolicy};
use crate::tool_manager::ToolManager;
use crate::validator::ResponseValidator;

/// Separator between pages when several URLs are scraped in one turn.
const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// What the caller wants gathered for one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub query: String,
    pub research_enabled: bool,
    pub options: FetchOptions,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_research(mut self, enabled: bool) -> Self {
        self.research_enabled = enabled;
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }
}

/// A source that was not invoked, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: SourceKind,
    pub reason: String,
}

/// Everything one turn gathered.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub query: String,
    /// Every source invocation, in order, including timeouts and failures.
    pub results: Vec<SourceResult>,
    pub skipped: Vec<SkippedSource>,
    pub used_sources: Vec<String>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    tools: ToolManager,
}

impl TurnReport {
    /// The turn's (frozen) tool registry.
    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn result_for(&self, source: SourceKind) -> Option<&SourceResult> {
        self.results.iter().find(|r| r.source == source)
    }

    /// Used source content, one titled section per source, for prompt
    /// assembly. Empty if nothing was used.
    pub fn context(&self) -> String {
        self.used_sources
            .iter()
            .filter_map(|name| {
                let content = self.tools.result_for(name)?;
                Some(format!("## {name}\n\n{}", content.trim()))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed(TurnReport),
    /// The outer deadline fired; the report holds what finished before it.
    TimedOut { deadline_ms: u64, report: TurnReport },
}

impl TurnOutcome {
    pub fn report(&self) -> &TurnReport {
        match self {
            Self::Completed(report) | Self::TimedOut { report, .. } => report,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// User-facing explanation for a timed-out turn.
    pub fn timeout_message(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::TimedOut { deadline_ms, .. } => Some(format!(
                "Gathering context took longer than {}s. Please try again with a narrower question, \
                 or without deep research.",
                deadline_ms / 1000
            )),
        }
    }
}

pub struct Orchestrator {
    knowledge: Option<Arc<dyn SourceFetcher>>,
    scraper: Option<Arc<dyn SourceFetcher>>,
    research: Option<Arc<dyn SourceFetcher>>,
    policy: RetrievalPolicy,
    deadline: Duration,
    validator: ResponseValidator,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Gather context for one turn under the outer deadline.
    pub async fn run_turn(&self, request: &TurnRequest) -> TurnOutcome {
        let started = Instant::now();
        let turn_id = Uuid::new_v4();
        let mut tools = ToolManager::new();
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        info!(%turn_id, query_len = request.query.len(), research = request.research_enabled, "Turn started");

        let gathered = tokio::time::timeout(
            self.deadline,
            self.gather(request, &mut tools, &mut results, &mut skipped),
        )
        .await;
        tools.freeze();

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = TurnReport {
            turn_id,
            query: request.query.clone(),
            results,
            skipped,
            used_sources: tools.used_sources(),
            elapsed_ms,
            tools,
        };

        match gathered {
            Ok(()) => {
                info!(%turn_id, elapsed_ms, used = ?report.used_sources, "Turn completed");
                TurnOutcome::Completed(report)
            }
            Err(_) => {
                let deadline_ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
                warn!(%turn_id, deadline_ms, "Turn deadline exceeded, abandoning in-flight sources");
                TurnOutcome::TimedOut {
                    deadline_ms,
                    report,
                }
            }
        }
    }

    /// Append attribution for any used source the response does not credit.
    pub fn validate_response(&self, response: &str, report: &TurnReport) -> String {
        self.validator.validate(response, &report.used_sources)
    }

    async fn gather(
        &self,
        request: &TurnRequest,
        tools: &mut ToolManager,
        results: &mut Vec<SourceResult>,
        skipped: &mut Vec<SkippedSource>,
    ) {
        let query = request.query.trim();
        let mut skip = |source: SourceKind, reason: String| {
            info!(source = %source, %reason, "Source skipped");
            skipped.push(SkippedSource { source, reason });
        };

        // 1. Knowledge base
        match &self.knowledge {
            Some(fetcher) if self.policy.should_query_knowledge_base(query) => {
                let result = fetcher.fetch(query, &request.options).await;
                if let Some(content) = result.usable_content() {
                    tools.register_result(result.source_name(), content);
                }
                results.push(result);
            }
            Some(_) => skip(
                SourceKind::KnowledgeBase,
                format!("query shorter than {} characters", self.policy.min_query_chars),
            ),
            None => skip(SourceKind::KnowledgeBase, "not configured".into()),
        }

        // 2. Web scraper
        let urls = self.policy.urls_to_scrape(query);
        match &self.scraper {
            _ if urls.is_empty() => skip(SourceKind::WebScraper, "no URLs in query".into()),
            None => skip(SourceKind::WebScraper, "not configured".into()),
            Some(fetcher) => {
                // Registered after every page so finished pages survive the outer deadline.
                let mut pages = Vec::new();
                for url in &urls {
                    let result = fetcher.fetch(url, &request.options).await;
                    if let Some(content) = result.usable_content() {
                        pages.push(content.to_string());
                        tools.register_result(SourceKind::WebScraper.name(), &pages.join(PAGE_SEPARATOR));
                    }
                    results.push(result);
                }
            }
        }

        // 3. Deep research
        if !request.research_enabled {
            skip(SourceKind::DeepResearch, "not requested".into());
            return;
        }
        let Some(fetcher) = &self.research else {
            skip(SourceKind::DeepResearch, "not configured".into());
            return;
        };

        let rag_chars = tools.content_len(SourceKind::KnowledgeBase.name());
        let scrape_chars = tools.content_len(SourceKind::WebScraper.name());
        match self.policy.research_decision(rag_chars, scrape_chars) {
            ResearchDecision::Skip {
                rag_chars,
                scrape_chars,
            } => skip(
                SourceKind::DeepResearch,
                format!(
                    "context already extensive ({rag_chars} knowledge base chars, {scrape_chars} scraped chars)"
                ),
            ),
            ResearchDecision::Run => {
                let result = fetcher.fetch(query, &request.options).await;
                if let Some(content) = result.usable_content() {
                    tools.register_result(result.source_name(), content);
                }
                results.push(result);
            }
        }
    }
}

/// Builds an [`Orchestrator`], rejecting configurations that cannot work.
pub struct OrchestratorBuilder {
    knowledge: Option<Arc<dyn SourceFetcher>>,
    scraper: Option<Arc<dyn SourceFetcher>>,
    research: Option<Arc<dyn SourceFetcher>>,
    policy: RetrievalPolicy,
    deadline: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        let turn = gatherline_config::TurnConfig::default();
        Self {
            knowledge: None,
            scraper: None,
            research: None,
            policy: RetrievalPolicy::from(&turn),
            deadline: turn.deadline(),
        }
    }
}

impl OrchestratorBuilder {
    pub fn knowledge_base(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.knowledge = Some(fetcher);
        self
    }

    pub fn web_scraper(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.scraper = Some(fetcher);
        self
    }

    pub fn deep_research(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.research = Some(fetcher);
        self
    }

    pub fn policy(mut self, policy: RetrievalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Take the policy and deadline from configuration.
    pub fn config(self, config: &AppConfig) -> Self {
        self.policy(RetrievalPolicy::from(&config.turn))
            .deadline(config.turn.deadline())
    }

    pub fn build(self) -> Result<Orchestrator> {
        if self.deadline.is_zero() {
            return Err(Error::config("turn deadline must be greater than zero"));
        }

        let slots = [
            (SourceKind::KnowledgeBase, &self.knowledge),
            (SourceKind::WebScraper, &self.scraper),
            (SourceKind::DeepResearch, &self.research),
        ];
        if slots.iter().all(|(_, fetcher)| fetcher.is_none()) {
            return Err(Error::config("no sources configured; a turn could gather nothing"));
        }
        for (expected, fetcher) in slots {
            if let Some(fetcher) = fetcher
                && fetcher.kind() != expected
            {
                return Err(Error::config(format!(
                    "{} fetcher registered in the {expected} slot",
                    fetcher.kind()
                )));
            }
        }

        Ok(Orchestrator {
            knowledge: self.knowledge,
            scraper: self.scraper,
            research: self.research,
            policy: self.policy,
            deadline: self.deadline,
            validator: ResponseValidator::new(),
        })
    }
}
