//! Post-hoc attribution check on the generated answer.
//!
//! For each used source the answer must match at least one attribution
//! pattern for that source. Sources with no match get a disclosure sentence
//! appended. The transform is deterministic and idempotent: the disclosure
//! itself satisfies the patterns it was added for.

use gatherline_core::SourceKind;
use regex_lite::Regex;
use tracing::debug;

const LEAD_INS: &str = r"(?:using (?:information|data|content) from|according to|based on|sourced from|drawn from)";

fn patterns_for(kind: SourceKind) -> Vec<String> {
    let synonyms = match kind {
        SourceKind::KnowledgeBase => {
            r"(?:(?:our|the) )?(?:knowledge base|internal (?:resources|documentation|docs|knowledge)|documentation)"
        }
        SourceKind::WebScraper => {
            r"(?:(?:the|your) )?(?:website(?: content)?|web ?page|page you shared|site|content you shared|scraped content)"
        }
        SourceKind::DeepResearch => {
            r"(?:(?:recent|external|web|online|deep) )+(?:research|sources|findings)"
        }
    };

    let mut patterns = vec![
        format!(r"(?i)\b{}\b", regex_lite::escape(kind.name())),
        format!(r"(?i)\b{LEAD_INS} {synonyms}"),
    ];
    patterns.extend(
        match kind {
            SourceKind::KnowledgeBase => &[
                r"(?i)\bknowledge base\b",
                r"(?i)\binternal resources\b",
                r"(?i)\binternal documentation\b",
            ][..],
            SourceKind::WebScraper => &[
                r"(?i)\bwebsite content\b",
                r"(?i)\bfrom your (?:site|website|page)\b",
                r"(?i)\bthe (?:page|link|url) you (?:shared|provided)\b",
            ][..],
            SourceKind::DeepResearch => &[
                r"(?i)\b(?:external|web|online) research\b",
                r"(?i)\bresearch (?:shows|indicates|suggests|found)\b",
            ][..],
        }
        .iter()
        .map(|p| p.to_string()),
    );
    patterns
}

/// How a source is named in the disclosure sentence.
pub fn friendly_name(source: &str) -> String {
    match SourceKind::from_name(source) {
        Some(SourceKind::KnowledgeBase) => "our knowledge base".into(),
        Some(SourceKind::WebScraper) => "the website content you shared".into(),
        Some(SourceKind::DeepResearch) => "external web research".into(),
        None => source.trim().to_string(),
    }
}

struct SourcePatterns {
    name: String,
    patterns: Vec<Regex>,
}

pub struct ResponseValidator {
    known: Vec<(SourceKind, Vec<Regex>)>,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseValidator {
    pub fn new() -> Self {
        let known = SourceKind::ALL
            .into_iter()
            .map(|kind| {
                let compiled = patterns_for(kind)
                    .iter()
                    .filter_map(|p| Regex::new(p).ok())
                    .collect();
                (kind, compiled)
            })
            .collect();
        Self { known }
    }

    fn patterns_for_source(&self, source: &str) -> SourcePatterns {
        if let Some(kind) = SourceKind::from_name(source)
            && let Some((_, patterns)) = self.known.iter().find(|(k, _)| *k == kind)
        {
            return SourcePatterns {
                name: kind.name().to_string(),
                patterns: patterns.clone(),
            };
        }

        // Unknown source: only an exact mention counts.
        let name = source.trim().to_string();
        let patterns = Regex::new(&format!("(?i){}", regex_lite::escape(&name)))
            .into_iter()
            .collect();
        SourcePatterns { name, patterns }
    }

    /// Used sources the response does not credit, in the given order.
    pub fn missing_sources(&self, response: &str, used_sources: &[String]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for source in used_sources {
            if source.trim().is_empty() {
                continue;
            }
            let entry = self.patterns_for_source(source);
            let credited = entry.patterns.iter().any(|re| re.is_match(response));
            if !credited && !missing.contains(&entry.name) {
                missing.push(entry.name);
            }
        }
        missing
    }

    /// Return `response`, with a disclosure appended if any used source is
    /// not credited.
    pub fn validate(&self, response: &str, used_sources: &[String]) -> String {
        if used_sources.is_empty() {
            return response.to_string();
        }

        let missing = self.missing_sources(response, used_sources);
        if missing.is_empty() {
            return response.to_string();
        }

        debug!(missing = ?missing, "Appending attribution disclosure");
        let disclosure = disclosure_sentence(&missing);
        let body = response.trim_end();
        if body.is_empty() {
            disclosure
        } else {
            format!("{body}\n\n{disclosure}")
        }
    }
}

fn disclosure_sentence(missing: &[String]) -> String {
    let names: Vec<String> = missing.iter().map(|s| friendly_name(s)).collect();
    let listed = match names.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} and {last}", rest.join(", ")),
    };
    format!("Note: This response includes information from {listed}.")
}
