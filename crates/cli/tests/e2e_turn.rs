//! End-to-end turn tests.
//!
//! These wire the real fetchers, cache store, metrics and orchestrator
//! together with scripted capability mocks standing in for the knowledge
//! search endpoint, the scraping service and the research API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gatherline_cache::CacheStore;
use gatherline_core::{
    KnowledgeDocument, KnowledgeSearch, PageScraper, ResearchAnswer, ResearchClient, ScrapedPage,
    SourceError, SourceKind, TIMEOUT_SENTINEL,
};
use gatherline_orchestrator::{Orchestrator, ResponseValidator, TurnOutcome, TurnRequest};
use gatherline_sources::{
    DeadlineGuard, DeepResearchFetcher, KnowledgeBaseFetcher, WebScrapeFetcher,
};
use gatherline_telemetry::CacheMetrics;

// ── Scripted capabilities ────────────────────────────────────────────────

struct ScriptedSearch {
    documents: Vec<KnowledgeDocument>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    fn new(documents: Vec<KnowledgeDocument>) -> Arc<Self> {
        Arc::new(Self {
            documents,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeSearch for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(
        &self,
        _query: &str,
        limit: usize,
        _threshold: f32,
    ) -> Result<Vec<KnowledgeDocument>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(120)).await;
        Ok(self.documents.iter().take(limit).cloned().collect())
    }
}

struct ScriptedScraper {
    body: String,
    calls: AtomicUsize,
}

impl ScriptedScraper {
    fn new(body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            body: body.into(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageScraper for ScriptedScraper {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn scrape(&self, url: &str) -> Result<ScrapedPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(800)).await;
        Ok(ScrapedPage {
            url: url.to_string(),
            title: "Pricing".into(),
            description: Some("Plans and prices".into()),
            content: self.body.clone(),
        })
    }
}

/// A research API that answers after `delay`, or never.
struct ScriptedResearch {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedResearch {
    fn answering_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchClient for ScriptedResearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn research(&self, query: &str) -> Result<ResearchAnswer, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
        Ok(ResearchAnswer {
            content: format!("Recent research on '{query}': adoption grew 12% last year."),
            model: "sonar".into(),
        })
    }
}

fn doc(id: &str, content: &str, similarity: f32) -> KnowledgeDocument {
    KnowledgeDocument {
        id: id.into(),
        title: Some(id.replace('-', " ")),
        content: content.into(),
        similarity,
    }
}

fn refund_documents() -> Vec<KnowledgeDocument> {
    vec![
        doc("refund-policy", "Refunds are accepted within 30 days of purchase.", 0.85),
        doc("returns-faq", "Items must be unused and in original packaging.", 0.80),
        doc("billing-help", "Refunds go back to the original payment method.", 0.78),
    ]
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<CacheStore>,
    metrics: Arc<CacheMetrics>,
    search: Arc<ScriptedSearch>,
    scraper: Arc<ScriptedScraper>,
    research: Arc<ScriptedResearch>,
}

impl Harness {
    fn new(
        search: Arc<ScriptedSearch>,
        scraper: Arc<ScriptedScraper>,
        research: Arc<ScriptedResearch>,
    ) -> Self {
        let metrics = Arc::new(CacheMetrics::new(0));
        let store = Arc::new(CacheStore::in_memory().with_observer(metrics.clone()));
        Self {
            store,
            metrics,
            search,
            scraper,
            research,
        }
    }

    fn guard(&self, kind: SourceKind, budget: Duration) -> DeadlineGuard {
        let metrics = self.metrics.clone();
        DeadlineGuard::new(kind.name(), budget)
            .with_timeout_hook(move |label, _| metrics.record_timeout(label))
    }

    fn orchestrator(&self, deadline: Duration) -> Orchestrator {
        let kb = KnowledgeBaseFetcher::new(self.search.clone(), self.store.clone(), Duration::from_secs(10))
            .with_guard(self.guard(SourceKind::KnowledgeBase, Duration::from_secs(10)));
        let web = WebScrapeFetcher::new(self.scraper.clone(), self.store.clone(), Duration::from_secs(15))
            .with_guard(self.guard(SourceKind::WebScraper, Duration::from_secs(15)));
        let research =
            DeepResearchFetcher::new(self.research.clone(), self.store.clone(), Duration::from_secs(20))
                .with_guard(self.guard(SourceKind::DeepResearch, Duration::from_secs(20)));

        Orchestrator::builder()
            .knowledge_base(Arc::new(kb))
            .web_scraper(Arc::new(web))
            .deep_research(Arc::new(research))
            .deadline(deadline)
            .build()
            .unwrap()
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn refund_question_uses_only_the_knowledge_base() {
    let harness = Harness::new(
        ScriptedSearch::new(refund_documents()),
        ScriptedScraper::new("unused"),
        ScriptedResearch::answering_after(Duration::from_secs(1)),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(110));

    let outcome = orchestrator
        .run_turn(&TurnRequest::new("What is the refund policy?"))
        .await;
    let report = outcome.report();

    assert!(matches!(outcome, TurnOutcome::Completed(_)));
    assert_eq!(harness.search.calls(), 1);
    assert_eq!(harness.scraper.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.research.calls(), 0);
    assert_eq!(report.used_sources, vec!["Knowledge Base"]);

    let kb = report.result_for(SourceKind::KnowledgeBase).unwrap();
    assert!(!kb.from_cache());
    assert!(
        kb.content()
            .starts_with("Found 3 relevant documents in the knowledge base (average similarity 81%)"),
        "{}",
        kb.content()
    );

    // The drafted answer forgot to credit the knowledge base.
    let validated =
        orchestrator.validate_response("Refunds are accepted within 30 days of purchase.", report);
    assert!(validated.ends_with("Note: This response includes information from our knowledge base."));
    assert!(
        ResponseValidator::new()
            .missing_sources(&validated, &report.used_sources)
            .is_empty()
    );

    // A credited answer passes through unchanged.
    let credited = "According to our knowledge base, refunds are accepted within 30 days.";
    assert_eq!(orchestrator.validate_response(credited, report), credited);
}

#[tokio::test(start_paused = true)]
async fn repeated_question_is_served_from_cache() {
    let harness = Harness::new(
        ScriptedSearch::new(refund_documents()),
        ScriptedScraper::new("unused"),
        ScriptedResearch::hanging(),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(110));

    let first = orchestrator
        .run_turn(&TurnRequest::new("What is the refund policy?"))
        .await;
    // Different casing and spacing hash to the same key.
    let second = orchestrator
        .run_turn(&TurnRequest::new("  what is the   REFUND policy? "))
        .await;

    assert_eq!(harness.search.calls(), 1);
    let cached = second.report().result_for(SourceKind::KnowledgeBase).unwrap();
    assert!(cached.from_cache());
    assert_eq!(
        cached.content(),
        first.report().result_for(SourceKind::KnowledgeBase).unwrap().content()
    );

    let rag = harness
        .metrics
        .snapshot()
        .for_namespace(gatherline_core::CacheNamespace::Rag);
    assert_eq!((rag.hits, rag.misses, rag.writes), (1, 1, 1));
}

#[tokio::test(start_paused = true)]
async fn hanging_research_times_out_without_stalling_the_turn() {
    let harness = Harness::new(
        ScriptedSearch::new(vec![]),
        ScriptedScraper::new("unused"),
        ScriptedResearch::hanging(),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(110));
    let started = tokio::time::Instant::now();

    let outcome = orchestrator
        .run_turn(&TurnRequest::new("Latest pricing trends for enterprise CRM software").with_research(true))
        .await;
    let waited = started.elapsed();

    assert!(matches!(outcome, TurnOutcome::Completed(_)));
    assert!(waited < Duration::from_secs(110), "turn took {waited:?}");
    assert!(waited >= Duration::from_secs(20));

    let report = outcome.report();
    let research = report.result_for(SourceKind::DeepResearch).unwrap();
    assert!(research.content().contains(TIMEOUT_SENTINEL));
    assert_eq!(research.content(), "Deep Research timed out after 20s");
    assert!(!research.from_cache());
    assert!(research.is_timeout());

    // Nothing usable was gathered, so nothing is attributed.
    assert!(report.used_sources.is_empty());
    assert_eq!(harness.metrics.snapshot().total_timeouts(), 1);

    // The timed-out answer was not cached.
    assert_eq!(
        harness
            .metrics
            .snapshot()
            .for_namespace(gatherline_core::CacheNamespace::DeepSearch)
            .writes,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn outer_deadline_returns_a_distinguishable_timeout() {
    let harness = Harness::new(
        ScriptedSearch::new(refund_documents()),
        ScriptedScraper::new("unused"),
        ScriptedResearch::hanging(),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(5));

    let outcome = orchestrator
        .run_turn(&TurnRequest::new("What is the refund policy?").with_research(true))
        .await;

    let TurnOutcome::TimedOut { deadline_ms, report } = &outcome else {
        panic!("expected a timed-out turn, got {outcome:?}");
    };
    assert_eq!(*deadline_ms, 5_000);
    // Work finished before the deadline is kept.
    assert_eq!(report.used_sources, vec!["Knowledge Base"]);
    assert!(outcome.timeout_message().unwrap().contains("longer than 5s"));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "timed_out");
}

#[tokio::test(start_paused = true)]
async fn extensive_context_skips_deep_research() {
    let long_doc = "Enterprise plans include SSO, audit logs and priority support. ".repeat(40);
    let harness = Harness::new(
        ScriptedSearch::new(vec![
            doc("enterprise-plan", &long_doc, 0.9),
            doc("enterprise-faq", &long_doc, 0.88),
            doc("enterprise-terms", &long_doc, 0.86),
        ]),
        ScriptedScraper::new("Pro costs $20 per seat. ".repeat(400)),
        ScriptedResearch::answering_after(Duration::from_secs(2)),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(110));

    let outcome = orchestrator
        .run_turn(
            &TurnRequest::new("Compare our enterprise plan with https://example.com/pricing please")
                .with_research(true),
        )
        .await;
    let report = outcome.report();

    assert_eq!(report.used_sources, vec!["Knowledge Base", "Web Scraper"]);
    assert_eq!(harness.research.calls(), 0);
    let skipped = report
        .skipped
        .iter()
        .find(|s| s.source == SourceKind::DeepResearch)
        .unwrap();
    assert!(skipped.reason.starts_with("context already extensive"));
}

#[tokio::test(start_paused = true)]
async fn thin_scrape_still_runs_deep_research() {
    let long_doc = "Enterprise plans include SSO, audit logs and priority support. ".repeat(40);
    let harness = Harness::new(
        ScriptedSearch::new(vec![
            doc("enterprise-plan", &long_doc, 0.9),
            doc("enterprise-faq", &long_doc, 0.88),
            doc("enterprise-terms", &long_doc, 0.86),
        ]),
        ScriptedScraper::new("Pro costs $20 per seat."),
        ScriptedResearch::answering_after(Duration::from_secs(2)),
    );
    let orchestrator = harness.orchestrator(Duration::from_secs(110));

    let outcome = orchestrator
        .run_turn(
            &TurnRequest::new("Compare our enterprise plan with https://example.com/pricing please")
                .with_research(true),
        )
        .await;
    let report = outcome.report();

    assert_eq!(harness.research.calls(), 1);
    assert_eq!(
        report.used_sources,
        vec!["Knowledge Base", "Web Scraper", "Deep Research"]
    );

    let answer = "Based on the website content, Pro costs $20 per seat.";
    let validated = orchestrator.validate_response(answer, report);
    assert_eq!(
        validated,
        format!(
            "{answer}\n\nNote: This response includes information from our knowledge base and external web research."
        )
    );

    let context = report.context();
    assert!(context.starts_with("## Knowledge Base\n\n"));
    assert!(context.contains("## Web Scraper\n\nContent from Pricing (https://example.com/pricing)"));
    assert!(context.contains("## Deep Research\n\nRecent research on"));
}

#[tokio::test(start_paused = true)]
async fn turns_do_not_share_tool_state() {
    let harness = Harness::new(
        ScriptedSearch::new(refund_documents()),
        ScriptedScraper::new("Pro costs $20 per seat."),
        ScriptedResearch::hanging(),
    );
    let orchestrator = Arc::new(harness.orchestrator(Duration::from_secs(110)));

    let a = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run_turn(&TurnRequest::new("What is the refund policy?"))
                .await
        })
    };
    let b = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run_turn(&TurnRequest::new("https://x.io/p"))
                .await
        })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a.report().used_sources, vec!["Knowledge Base"]);
    assert_eq!(b.report().used_sources, vec!["Web Scraper"]);
    assert!(a.report().tools().is_frozen());
    assert!(b.report().tools().result_for("Knowledge Base").is_none());
}
