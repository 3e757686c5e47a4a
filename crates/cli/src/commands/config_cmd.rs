//! `gatherline config`: configuration management commands.

use gatherline_config::AppConfig;

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.cache.has_remote() {
                warnings.push("No cache URL/token set; each process keeps its own in-memory cache");
            }
            if config.sources.research_api_key.is_none() {
                warnings.push("No research API key set (GATHERLINE_RESEARCH_API_KEY or PERPLEXITY_API_KEY)");
            }
            if config.turn.max_scrape_urls == 0 {
                warnings.push("turn.max_scrape_urls is 0; shared links will never be scraped");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Cache:     {}", if config.cache.has_remote() { "networked" } else { "in-memory" });
            println!("   Deadline:  {} ms", config.turn.deadline_ms);
            println!("   Research:  {}", config.sources.research_model);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    println!("{}", render_redacted(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("⚠️  Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// TOML for display with tokens and keys masked.
fn render_redacted(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.cache.token.is_some() {
        shown.cache.token = Some("[REDACTED]".into());
    }
    if shown.sources.research_api_key.is_some() {
        shown.sources.research_api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&shown)
}
