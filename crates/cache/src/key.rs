//! Cache key derivation.
//!
//! A key is `sha256(stable_stringify({ query, options }))`, hex encoded and
//! truncated to 16 characters. Free text is normalized first and object keys
//! are sorted at every level, so option order never changes the key.

use gatherline_core::CacheNamespace;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Length of the hex digest prefix used as the key.
pub const KEY_HEX_LEN: usize = 16;

/// Lower-case, trim, and collapse internal whitespace runs.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Serialize a JSON value with object keys sorted at every level.
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_stable(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash an arbitrary semantic key object into a short hex key.
pub fn hash_semantic(semantic: &Value) -> String {
    let digest = Sha256::digest(stable_stringify(semantic).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(KEY_HEX_LEN);
    hex
}

/// Derive the short key for a free-text query plus its options.
pub fn derive_key(query: &str, options: &Map<String, Value>) -> String {
    let semantic = serde_json::json!({
        "query": normalize_query(query),
        "options": Value::Object(options.clone()),
    });
    hash_semantic(&semantic)
}

/// Derive the short key for a URL plus its options. Paths and query strings
/// are case-sensitive, so only surrounding whitespace is dropped.
pub fn derive_url_key(url: &str, options: &Map<String, Value>) -> String {
    let semantic = serde_json::json!({
        "url": url.trim(),
        "options": Value::Object(options.clone()),
    });
    hash_semantic(&semantic)
}

/// A fully-qualified cache key: `[<scope>:]<namespace>:<hash>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: Option<String>,
    pub namespace: CacheNamespace,
    pub key: String,
}

impl CacheKey {
    pub fn new(scope: Option<&str>, namespace: CacheNamespace, key: impl Into<String>) -> Self {
        Self {
            scope: scope.filter(|s| !s.is_empty()).map(str::to_string),
            namespace,
            key: key.into(),
        }
    }

    /// Parse `ns:key` or `scope:ns:key`. The key part may itself contain colons.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let first = parts.next()?;
        let second = parts.next()?;
        match parts.next() {
            Some(rest) => {
                if let Some(ns) = CacheNamespace::parse(second) {
                    Some(Self::new(Some(first), ns, rest))
                } else {
                    // `ns:key:with:colons`
                    let ns = CacheNamespace::parse(first)?;
                    Some(Self::new(None, ns, format!("{second}:{rest}")))
                }
            }
            None => Some(Self::new(None, CacheNamespace::parse(first)?, second)),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{scope}:")?;
        }
        write!(f, "{}:{}", self.namespace, self.key)
    }
}
