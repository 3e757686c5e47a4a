//! `gatherline inspect`: read-only view of one cache entry.

use gatherline_cache::{CacheInspection, CacheStore};

pub async fn run(key: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let store = CacheStore::open(&config.cache);
    let inspection = store.inspect(key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
    } else {
        print!("{}", render(&inspection, store.backend_name()));
    }
    Ok(())
}

fn render(inspection: &CacheInspection, backend: &str) -> String {
    let mut out = format!("🔍 {} ({backend})\n", inspection.key);
    if !inspection.exists {
        out.push_str("  (not found)\n");
        return out;
    }
    out.push_str(&format!("  Type:     {}\n", inspection.value_type));
    out.push_str(&format!("  Length:   {} chars\n", inspection.length));
    if inspection.is_double_encoded() {
        out.push_str(&format!(
            "  ⚠️  JSON encoded {} extra time(s) as a string\n",
            inspection.nested_encodings
        ));
    } else if inspection.looks_like_json {
        out.push_str("  ⚠️  String value looks like JSON\n");
    }
    out.push_str(&format!("  Preview:  {}\n", inspection.preview));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatherline_core::CacheNamespace;
    use serde_json::json;

    #[tokio::test]
    async fn renders_missing_key() {
        let store = CacheStore::in_memory();
        let inspection = store.inspect("rag:0000000000000000").await.unwrap();
        let text = render(&inspection, store.backend_name());
        assert!(text.contains("(not found)"));
    }

    #[tokio::test]
    async fn flags_double_encoding() {
        let store = CacheStore::in_memory();
        let inner = json!({ "content": "Refunds within 30 days" }).to_string();
        let twice = serde_json::to_string(&inner).unwrap();
        store
            .set(CacheNamespace::Rag, "abc", &json!(twice), None)
            .await;

        let inspection = store.inspect("rag:abc").await.unwrap();
        let text = render(&inspection, "in_memory");
        assert!(text.contains("Type:     string"), "{text}");
        assert!(text.contains("extra time(s)"), "{text}");
    }
}
