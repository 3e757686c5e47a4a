//! `gatherline key`: print the cache key a query would be stored under.

use gatherline_cache::{CacheKey, derive_key, derive_url_key};
use gatherline_core::CacheNamespace;
use serde_json::{Map, Value};

pub fn run(namespace: &str, query: &str, params: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let key = full_key(config.cache.scope.as_deref(), namespace, query, params)?;
    println!("{key}");
    Ok(())
}

fn full_key(
    scope: Option<&str>,
    namespace: &str,
    query: &str,
    params: &[String],
) -> Result<String, Box<dyn std::error::Error>> {
    let namespace = CacheNamespace::parse(namespace).ok_or_else(|| {
        format!("Unknown namespace '{namespace}' (expected rag, scrape, deepsearch, ops)")
    })?;
    let options = parse_params(params)?;
    let hash = match namespace {
        CacheNamespace::Scrape => derive_url_key(query, &options),
        _ => derive_key(query, &options),
    };
    let key = CacheKey::new(scope, namespace, hash);
    Ok(key.to_string())
}

/// `name=value` pairs. Values that parse as JSON (numbers, booleans) keep
/// their type so keys match what the fetchers derive.
fn parse_params(params: &[String]) -> Result<Map<String, Value>, String> {
    let mut options = Map::new();
    for param in params {
        let (name, raw) = param
            .split_once('=')
            .ok_or_else(|| format!("Invalid parameter '{param}', expected NAME=VALUE"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        options.insert(name.trim().to_string(), value);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_namespace_and_short_hash() {
        let key = full_key(None, "rag", "What is the refund policy?", &[]).unwrap();
        let (ns, hash) = key.split_once(':').unwrap();
        assert_eq!(ns, "rag");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scope_prefixes_the_key() {
        let key = full_key(Some("global"), "rag", "refunds", &[]).unwrap();
        assert!(key.starts_with("global:rag:"));
    }

    #[test]
    fn typed_params_change_the_key() {
        let plain = full_key(None, "rag", "refunds", &[]).unwrap();
        let limited = full_key(None, "rag", "refunds", &["limit=5".into()]).unwrap();
        assert_ne!(plain, limited);

        let options = parse_params(&["limit=5".into(), "mode=fast".into()]).unwrap();
        assert_eq!(options["limit"], serde_json::json!(5));
        assert_eq!(options["mode"], serde_json::json!("fast"));
    }

    #[test]
    fn scrape_keys_match_the_fetcher_and_keep_case() {
        let upper = full_key(None, "scrape", "https://docs.example.com/Guide", &[]).unwrap();
        let lower = full_key(None, "scrape", "https://docs.example.com/guide", &[]).unwrap();
        assert_ne!(upper, lower);
        assert_eq!(
            upper,
            format!("scrape:{}", derive_url_key("https://docs.example.com/Guide", &Map::new()))
        );
    }

    #[test]
    fn rejects_unknown_namespace_and_bad_params() {
        assert!(full_key(None, "sessions", "q", &[]).is_err());
        assert!(parse_params(&["novalue".into()]).is_err());
    }
}
