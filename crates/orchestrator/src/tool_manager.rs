//! Per-turn registry of which sources contributed and what they returned.
//!
//! A `ToolManager` lives for exactly one turn. It is created by the
//! orchestrator, frozen when the turn ends (normally or by deadline), and
//! handed back inside the turn report. Nothing here is shared across turns.

use gatherline_core::SourceKind;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct ToolManager {
    used: Vec<String>,
    results: HashMap<String, String>,
    frozen: bool,
}

/// Known sources resolve to their display name; anything else is kept as given.
fn canonical(source: &str) -> String {
    match SourceKind::from_name(source) {
        Some(kind) => kind.name().to_string(),
        None => source.trim().to_string(),
    }
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content` as used output of `source`.
    ///
    /// Blank content is ignored. Registering a source again replaces its
    /// content without duplicating it in [`used_sources`](Self::used_sources).
    pub fn register_result(&mut self, source: &str, content: &str) {
        if self.frozen {
            debug!(source, "Turn already complete, registration discarded");
            return;
        }
        if content.trim().is_empty() {
            return;
        }

        let name = canonical(source);
        if !self.used.contains(&name) {
            self.used.push(name.clone());
        }
        self.results.insert(name, content.to_string());
    }

    /// Store a result without marking the source as used, e.g. a cache
    /// warm-up whose output did not feed the answer.
    pub fn record_prefetch(&mut self, source: &str, content: &str) {
        if self.frozen || content.trim().is_empty() {
            return;
        }
        let name = canonical(source);
        self.results.entry(name).or_insert_with(|| content.to_string());
    }

    pub fn has_been_used(&self, source: &str) -> bool {
        self.used.contains(&canonical(source))
    }

    /// Used sources in registration order.
    pub fn used_sources(&self) -> Vec<String> {
        self.used.clone()
    }

    pub fn result_for(&self, source: &str) -> Option<&str> {
        self.results.get(&canonical(source)).map(String::as_str)
    }

    /// Characters of used content registered for `source` (0 if none).
    pub fn content_len(&self, source: &str) -> usize {
        let name = canonical(source);
        if !self.used.contains(&name) {
            return 0;
        }
        self.results.get(&name).map_or(0, |c| c.chars().count())
    }

    /// Stop accepting registrations.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
