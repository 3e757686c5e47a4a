//! `gatherline doctor`: diagnose cache and source configuration.

use gatherline_cache::CacheStore;
use gatherline_config::AppConfig;
use gatherline_sources::ChatResearchClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 gatherline Doctor: System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ℹ️  No config file, using defaults (run `gatherline config init`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    // Cache backend: connecting runs the liveness probe.
    let store = CacheStore::connect(&config.cache).await;
    match store.fallback_reason() {
        None => println!("  ✅ Cache backend '{}' passed its probe", store.backend_name()),
        Some(reason) if config.cache.has_remote() => {
            println!("  ❌ Cache backend unreachable ({reason}); using in-memory store");
            issues += 1;
        }
        Some(reason) => {
            println!("  ⚠️  No shared cache configured ({reason}); results are per-process");
            issues += 1;
        }
    }
    if let Some(scope) = &config.cache.scope {
        println!("  ℹ️  Cache keys scoped under '{scope}:'");
    }

    // Sources
    match &config.sources.knowledge_url {
        Some(url) => println!("  ✅ Knowledge base endpoint: {url}"),
        None => println!("  ⚠️  No knowledge endpoint (use `ask --docs <dir>` for a local index)"),
    }
    match &config.sources.scraper_url {
        Some(url) => println!("  ✅ Scraper endpoint: {url}"),
        None => {
            println!("  ⚠️  No scraper endpoint; URLs in queries will be ignored");
            issues += 1;
        }
    }
    match ChatResearchClient::from_config(&config.sources) {
        Ok(_) => println!(
            "  ✅ Deep research: {} via {}",
            config.sources.research_model, config.sources.research_url
        ),
        Err(e) => {
            println!("  ⚠️  Deep research disabled: {e}");
            issues += 1;
        }
    }

    println!(
        "  ℹ️  Turn deadline {}s; source budgets kb={}ms scrape={}ms research={}ms",
        config.turn.deadline().as_secs(),
        config.sources.knowledge_timeout_ms,
        config.sources.scrape_timeout_ms,
        config.sources.research_timeout_ms
    );

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
