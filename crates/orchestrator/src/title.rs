//! Conversation title generation on the first message.
//!
//! Duplicate triggers for the same conversation race for a cache lock; only
//! the holder generates. A global fixed-window rate limit bounds generation
//! across all conversations. The lock is released before `generate_once`
//! returns, whatever the outcome.

use async_trait::async_trait;
use gatherline_cache::{CacheLock, CacheStore, RateDecision, RateLimiter};
use gatherline_config::TitleConfig;
use gatherline_core::Result;
use gatherline_sources::{DeadlineGuard, Raced};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Rate-limit bucket shared by every conversation.
const RATE_BUCKET: &str = "title-generation";

/// Longest title kept, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Produces a short title from a conversation's first message.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(&self, first_message: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleOutcome {
    Generated(String),
    /// Another trigger holds this conversation's lock.
    AlreadyRunning,
    RateLimited,
    Failed(String),
}

pub struct TitleCoordinator {
    generator: Arc<dyn TitleGenerator>,
    lock: CacheLock,
    limiter: RateLimiter,
    guard: DeadlineGuard,
}

impl TitleCoordinator {
    pub fn new(store: Arc<CacheStore>, generator: Arc<dyn TitleGenerator>, config: &TitleConfig) -> Self {
        let lock_ttl = Duration::from_secs(config.lock_ttl_secs);
        Self {
            generator,
            lock: CacheLock::new(store.clone(), lock_ttl),
            limiter: RateLimiter::new(
                store,
                config.rate_limit,
                Duration::from_secs(config.rate_window_secs),
            ),
            // Generation must finish while the lock is still held.
            guard: DeadlineGuard::new("Title generation", lock_ttl),
        }
    }

    /// Generate a title for `conversation_id` unless another trigger is
    /// already doing so or the global rate limit is exhausted.
    pub async fn generate_once(&self, conversation_id: &str, first_message: &str) -> TitleOutcome {
        let lock_name = format!("title:{conversation_id}");
        let held = match self.lock.acquire(&lock_name).await {
            Ok(Some(held)) => held,
            Ok(None) => {
                info!(conversation_id, "Title generation already in progress");
                return TitleOutcome::AlreadyRunning;
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Title lock unavailable");
                return TitleOutcome::Failed(format!("lock unavailable: {e}"));
            }
        };

        let outcome = self.generate_locked(first_message).await;
        self.lock.release(held).await;

        info!(conversation_id, outcome = ?outcome, "Title generation finished");
        outcome
    }

    async fn generate_locked(&self, first_message: &str) -> TitleOutcome {
        match self.limiter.check(RATE_BUCKET).await {
            Ok(RateDecision::Allowed { .. }) => {}
            Ok(RateDecision::Limited { count }) => {
                warn!(count, "Title generation rate limited");
                return TitleOutcome::RateLimited;
            }
            Err(e) => return TitleOutcome::Failed(format!("rate limiter unavailable: {e}")),
        }

        let generator = self.generator.clone();
        let message = first_message.to_string();
        let raced = self
            .guard
            .run(async move { generator.generate(&message).await })
            .await;

        match raced {
            Raced::Settled(Ok(title)) => match clean_title(&title) {
                Some(title) => TitleOutcome::Generated(title),
                None => TitleOutcome::Failed("generator returned an empty title".into()),
            },
            Raced::Settled(Err(e)) => TitleOutcome::Failed(e.to_string()),
            Raced::TimedOut => TitleOutcome::Failed(format!(
                "timed out after {}s",
                self.guard.budget().as_secs()
            )),
            Raced::Aborted(reason) => TitleOutcome::Failed(reason),
        }
    }
}

/// Strip quotes and whitespace, collapse to one line, and cap the length.
fn clean_title(raw: &str) -> Option<String> {
    let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = line.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect())
}
