//! Configuration loading, validation, and management for gatherline.
//!
//! Loads configuration from `~/.gatherline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use gatherline_core::CacheNamespace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.gatherline/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Shared cache store
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retrieval sources: endpoints and per-source deadlines
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Per-turn orchestration policy
    #[serde(default)]
    pub turn: TurnConfig,

    /// Title generation lock and rate limit
    #[serde(default)]
    pub title: TitleConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Cache ────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// REST endpoint of the networked store. Absent ⇒ in-memory fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token for the networked store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Optional scope segment prefixed to every key (e.g. "global").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Emit a hit/miss summary every N operations (0 = never).
    #[serde(default = "default_report_every")]
    pub report_every: u64,

    /// Emit a hit/miss summary on this interval (0 = never).
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Namespace TTL overrides
    #[serde(default)]
    pub ttl: TtlConfig,
}

fn default_report_every() -> u64 {
    100
}
fn default_report_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            scope: None,
            report_every: default_report_every(),
            report_interval_secs: default_report_interval_secs(),
            ttl: TtlConfig::default(),
        }
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("scope", &self.scope)
            .field("report_every", &self.report_every)
            .field("report_interval_secs", &self.report_interval_secs)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CacheConfig {
    /// Whether both connection parameters for the networked store are set.
    pub fn has_remote(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Default TTL per namespace, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_rag_ttl")]
    pub rag_secs: u64,
    #[serde(default = "default_scrape_ttl")]
    pub scrape_secs: u64,
    #[serde(default = "default_short_ttl")]
    pub deepsearch_secs: u64,
    #[serde(default = "default_short_ttl")]
    pub ops_secs: u64,
}

fn default_rag_ttl() -> u64 {
    CacheNamespace::Rag.default_ttl().as_secs()
}
fn default_scrape_ttl() -> u64 {
    CacheNamespace::Scrape.default_ttl().as_secs()
}
fn default_short_ttl() -> u64 {
    CacheNamespace::Ops.default_ttl().as_secs()
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            rag_secs: default_rag_ttl(),
            scrape_secs: default_scrape_ttl(),
            deepsearch_secs: default_short_ttl(),
            ops_secs: default_short_ttl(),
        }
    }
}

impl TtlConfig {
    /// The configured TTL for a namespace.
    pub fn for_namespace(&self, namespace: CacheNamespace) -> Duration {
        let secs = match namespace {
            CacheNamespace::Rag => self.rag_secs,
            CacheNamespace::Scrape => self.scrape_secs,
            CacheNamespace::DeepSearch => self.deepsearch_secs,
            CacheNamespace::Ops => self.ops_secs,
        };
        Duration::from_secs(secs)
    }
}

// ── Sources ──────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Knowledge search endpoint (POST, JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_url: Option<String>,

    #[serde(default = "default_knowledge_timeout_ms")]
    pub knowledge_timeout_ms: u64,

    /// Documents requested per knowledge search.
    #[serde(default = "default_match_count")]
    pub knowledge_match_count: usize,

    /// Minimum similarity for a knowledge document to count.
    #[serde(default = "default_match_threshold")]
    pub knowledge_threshold: f32,

    /// Scraping microservice endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper_url: Option<String>,

    #[serde(default = "default_scrape_timeout_ms")]
    pub scrape_timeout_ms: u64,

    /// Chat-completions endpoint of the research API.
    #[serde(default = "default_research_url")]
    pub research_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_api_key: Option<String>,

    #[serde(default = "default_research_model")]
    pub research_model: String,

    #[serde(default = "default_research_timeout_ms")]
    pub research_timeout_ms: u64,
}

fn default_knowledge_timeout_ms() -> u64 {
    10_000
}
fn default_match_count() -> usize {
    5
}
fn default_match_threshold() -> f32 {
    0.5
}
fn default_scrape_timeout_ms() -> u64 {
    15_000
}
fn default_research_url() -> String {
    "https://api.perplexity.ai".into()
}
fn default_research_model() -> String {
    "sonar".into()
}
fn default_research_timeout_ms() -> u64 {
    20_000
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            knowledge_url: None,
            knowledge_timeout_ms: default_knowledge_timeout_ms(),
            knowledge_match_count: default_match_count(),
            knowledge_threshold: default_match_threshold(),
            scraper_url: None,
            scrape_timeout_ms: default_scrape_timeout_ms(),
            research_url: default_research_url(),
            research_api_key: None,
            research_model: default_research_model(),
            research_timeout_ms: default_research_timeout_ms(),
        }
    }
}

impl std::fmt::Debug for SourcesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcesConfig")
            .field("knowledge_url", &self.knowledge_url)
            .field("knowledge_timeout_ms", &self.knowledge_timeout_ms)
            .field("knowledge_match_count", &self.knowledge_match_count)
            .field("knowledge_threshold", &self.knowledge_threshold)
            .field("scraper_url", &self.scraper_url)
            .field("scrape_timeout_ms", &self.scrape_timeout_ms)
            .field("research_url", &self.research_url)
            .field("research_api_key", &redact(&self.research_api_key))
            .field("research_model", &self.research_model)
            .field("research_timeout_ms", &self.research_timeout_ms)
            .finish()
    }
}

impl SourcesConfig {
    pub fn knowledge_timeout(&self) -> Duration {
        Duration::from_millis(self.knowledge_timeout_ms)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_millis(self.scrape_timeout_ms)
    }

    pub fn research_timeout(&self) -> Duration {
        Duration::from_millis(self.research_timeout_ms)
    }
}

// ── Turn ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Hard wall-clock deadline for gathering context in one turn.
    #[serde(default = "default_turn_deadline_ms")]
    pub deadline_ms: u64,

    /// Queries shorter than this skip the knowledge base.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    /// Knowledge-base content longer than this counts as extensive.
    #[serde(default = "default_rag_extensive_chars")]
    pub rag_extensive_chars: usize,

    /// Scraped content longer than this counts as extensive.
    #[serde(default = "default_scrape_extensive_chars")]
    pub scrape_extensive_chars: usize,

    /// At most this many detected URLs are scraped per turn.
    #[serde(default = "default_max_scrape_urls")]
    pub max_scrape_urls: usize,
}

fn default_turn_deadline_ms() -> u64 {
    110_000
}
fn default_min_query_chars() -> usize {
    15
}
fn default_rag_extensive_chars() -> usize {
    5_000
}
fn default_scrape_extensive_chars() -> usize {
    8_000
}
fn default_max_scrape_urls() -> usize {
    3
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_turn_deadline_ms(),
            min_query_chars: default_min_query_chars(),
            rag_extensive_chars: default_rag_extensive_chars(),
            scrape_extensive_chars: default_scrape_extensive_chars(),
            max_scrape_urls: default_max_scrape_urls(),
        }
    }
}

impl TurnConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

// ── Title generation ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// How long a per-conversation generation lock is held at most.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Maximum generations across all conversations per window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: i64,

    /// Length of the rolling rate-limit window.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

fn default_lock_ttl_secs() -> u64 {
    30
}
fn default_rate_limit() -> i64 {
    20
}
fn default_rate_window_secs() -> u64 {
    60
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.gatherline/config.toml).
    ///
    /// Environment variables override the file:
    /// - `GATHERLINE_CACHE_URL`, then `UPSTASH_REDIS_REST_URL`
    /// - `GATHERLINE_CACHE_TOKEN`, then `UPSTASH_REDIS_REST_TOKEN`
    /// - `GATHERLINE_RESEARCH_API_KEY`, then `PERPLEXITY_API_KEY`
    /// - `GATHERLINE_SCRAPER_URL`, `GATHERLINE_KNOWLEDGE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| names.iter().find_map(|n| var(*n));

        if let Some(url) = first(&["GATHERLINE_CACHE_URL", "UPSTASH_REDIS_REST_URL"]) {
            self.cache.url = Some(url);
        }
        if let Some(token) = first(&["GATHERLINE_CACHE_TOKEN", "UPSTASH_REDIS_REST_TOKEN"]) {
            self.cache.token = Some(token);
        }
        if let Some(key) = first(&["GATHERLINE_RESEARCH_API_KEY", "PERPLEXITY_API_KEY"]) {
            self.sources.research_api_key = Some(key);
        }
        if let Some(url) = var("GATHERLINE_SCRAPER_URL") {
            self.sources.scraper_url = Some(url);
        }
        if let Some(url) = var("GATHERLINE_KNOWLEDGE_URL") {
            self.sources.knowledge_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".gatherline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.turn.deadline_ms == 0 {
            return Err(ConfigError::ValidationError(
                "turn.deadline_ms must be > 0".into(),
            ));
        }

        let per_source = [
            ("sources.knowledge_timeout_ms", self.sources.knowledge_timeout_ms),
            ("sources.scrape_timeout_ms", self.sources.scrape_timeout_ms),
            ("sources.research_timeout_ms", self.sources.research_timeout_ms),
        ];
        for (name, timeout) in per_source {
            if timeout >= self.turn.deadline_ms {
                return Err(ConfigError::ValidationError(format!(
                    "{name} ({timeout}) must be smaller than turn.deadline_ms ({})",
                    self.turn.deadline_ms
                )));
            }
        }

        if self.turn.rag_extensive_chars == 0 || self.turn.scrape_extensive_chars == 0 {
            return Err(ConfigError::ValidationError(
                "extensive-context thresholds must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sources.knowledge_threshold) {
            return Err(ConfigError::ValidationError(
                "sources.knowledge_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
