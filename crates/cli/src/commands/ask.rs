//! `gatherline ask`: run one retrieval turn.

use gatherline_cache::CacheStore;
use gatherline_config::AppConfig;
use gatherline_core::{FetchOptions, KnowledgeSearch, SourceKind};
use gatherline_orchestrator::{Orchestrator, TurnOutcome, TurnRequest};
use gatherline_sources::{
    ChatResearchClient, DeadlineGuard, DeepResearchFetcher, HashingEmbedder, HttpKnowledgeSearch,
    HttpScraper, KnowledgeBaseFetcher, VectorKnowledgeBase, WebScrapeFetcher,
};
use gatherline_telemetry::{CacheMetrics, MetricsReporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AskArgs {
    pub query: String,
    pub research: bool,
    pub docs: Option<PathBuf>,
    pub answer: Option<String>,
    pub no_cache: bool,
    pub json: bool,
}

pub async fn run(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let (store, metrics) = super::open_store(&config).await;
    let reporter = MetricsReporter::start(
        metrics.clone(),
        Duration::from_secs(config.cache.report_interval_secs),
    );

    let orchestrator = build_orchestrator(&config, store, &metrics, args.docs.as_deref()).await?;

    let mut options = FetchOptions::default();
    if args.no_cache {
        options = options.bypassing_cache();
    }
    let request = TurnRequest::new(&args.query)
        .with_research(args.research)
        .with_options(options);
    let outcome = orchestrator.run_turn(&request).await;

    let validated = args
        .answer
        .map(|answer| orchestrator.validate_response(&answer, outcome.report()));

    if args.json {
        println!("{}", render_json(&outcome, validated.as_deref())?);
    } else {
        print_outcome(&outcome);
        if let Some(validated) = validated {
            println!("\n📝 Validated answer\n{validated}");
        }
    }

    reporter.shutdown().await?;
    Ok(())
}

/// Wire fetchers from configuration. Sources without an endpoint are left out.
async fn build_orchestrator(
    config: &AppConfig,
    store: Arc<CacheStore>,
    metrics: &Arc<CacheMetrics>,
    docs: Option<&Path>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let guard = |kind: SourceKind, budget: Duration| {
        let metrics = metrics.clone();
        DeadlineGuard::new(kind.name(), budget)
            .with_timeout_hook(move |label, _| metrics.record_timeout(label))
    };

    let mut builder = Orchestrator::builder().config(config);

    let search: Option<Arc<dyn KnowledgeSearch>> = match (docs, &config.sources.knowledge_url) {
        (Some(dir), _) => Some(Arc::new(index_directory(dir).await?)),
        (None, Some(url)) => Some(Arc::new(HttpKnowledgeSearch::new(url)?)),
        (None, None) => None,
    };
    if let Some(search) = search {
        let fetcher = KnowledgeBaseFetcher::from_config(search, store.clone(), &config.sources)
            .with_guard(guard(SourceKind::KnowledgeBase, config.sources.knowledge_timeout()));
        builder = builder.knowledge_base(Arc::new(fetcher));
    }

    if let Some(url) = &config.sources.scraper_url {
        let scraper = Arc::new(HttpScraper::new(url)?);
        let fetcher = WebScrapeFetcher::from_config(scraper, store.clone(), &config.sources)
            .with_guard(guard(SourceKind::WebScraper, config.sources.scrape_timeout()));
        builder = builder.web_scraper(Arc::new(fetcher));
    }

    match ChatResearchClient::from_config(&config.sources) {
        Ok(client) => {
            let fetcher = DeepResearchFetcher::from_config(Arc::new(client), store, &config.sources)
                .with_guard(guard(SourceKind::DeepResearch, config.sources.research_timeout()));
            builder = builder.deep_research(Arc::new(fetcher));
        }
        Err(e) => info!(reason = %e, "Deep research unavailable"),
    }

    Ok(builder.build()?)
}

/// Index every `.md` and `.txt` file directly under `dir`.
async fn index_directory(dir: &Path) -> Result<VectorKnowledgeBase, Box<dyn std::error::Error>> {
    let kb = VectorKnowledgeBase::new(Arc::new(HashingEmbedder::default()));
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| format!("Cannot read docs directory {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "md" || ext == "txt")
        })
        .collect();
    entries.sort();

    for path in entries {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                continue;
            }
        };
        let title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        kb.add_document(path.display().to_string(), title, content)
            .await?;
    }

    info!(documents = kb.len().await, dir = %dir.display(), "Indexed knowledge documents");
    Ok(kb)
}

/// One JSON document: the outcome, plus `validated_answer` when given.
fn render_json(outcome: &TurnOutcome, validated: Option<&str>) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(outcome)?;
    if let (Some(validated), Some(fields)) = (validated, value.as_object_mut()) {
        fields.insert("validated_answer".into(), validated.into());
    }
    serde_json::to_string_pretty(&value)
}

fn print_outcome(outcome: &TurnOutcome) {
    let report = outcome.report();
    println!("🔎 Turn {} ({} ms)", report.turn_id, report.elapsed_ms);
    println!("========================================");

    for result in &report.results {
        let origin = if result.from_cache() { "cache" } else { "live" };
        let status = if result.is_timeout() {
            "⏱️ "
        } else if result.usable_content().is_some() {
            "✅"
        } else {
            "⚠️ "
        };
        println!(
            "  {status} {:<15} {origin:<5} {:>6} ms",
            result.source_name(),
            result.elapsed_ms
        );
    }
    for skipped in &report.skipped {
        println!("  ⏭️  {:<15} skipped: {}", skipped.source.name(), skipped.reason);
    }

    if let Some(message) = outcome.timeout_message() {
        println!("\n⏱️  {message}");
    }

    println!();
    if report.used_sources.is_empty() {
        println!("No sources contributed context.");
    } else {
        println!("Used sources: {}", report.used_sources.join(", "));
        println!("\n{}", report.context());
    }
}
