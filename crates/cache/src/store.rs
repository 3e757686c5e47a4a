//! The namespaced cache facade.
//!
//! `CacheStore` is the one long-lived cache handle per process. It never
//! surfaces backend failures from `get`/`set`/`exists`/`delete`: a failed read
//! is a miss, a failed write is dropped, and both are logged.

use gatherline_config::{CacheConfig, TtlConfig};
use gatherline_core::error::CacheError;
use gatherline_core::{CacheBackend, CacheNamespace, CacheObserver, NoopObserver};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::in_memory::InMemoryBackend;
use crate::inspect::{self, CacheInspection};
use crate::key::CacheKey;
use crate::rest::RestBackend;

pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    scope: Option<String>,
    ttl: TtlConfig,
    observer: Arc<dyn CacheObserver>,
    fallback_reason: Option<String>,
}

impl CacheStore {
    /// Wrap an explicit backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            scope: None,
            ttl: TtlConfig::default(),
            observer: Arc::new(NoopObserver),
            fallback_reason: None,
        }
    }

    /// A store backed only by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// Prefix every key with a scope segment (e.g. "global").
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        self.scope = (!scope.is_empty()).then_some(scope);
        self
    }

    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build the store described by configuration.
    ///
    /// When connection parameters are absent, or the networked backend fails
    /// its liveness probe, the in-memory backend is used for the rest of the
    /// process lifetime.
    pub async fn connect(config: &CacheConfig) -> Self {
        let backend = match Self::remote_backend(config) {
            Ok(backend) => match probe(backend.as_ref()).await {
                Ok(()) => Ok(backend),
                Err(e) => Err(e.to_string()),
            },
            Err(reason) => Err(reason),
        };

        let store = match backend {
            Ok(backend) => {
                info!(backend = backend.name(), "Cache: networked backend ready");
                Self::new(backend)
            }
            Err(reason) => {
                if config.has_remote() {
                    warn!(%reason, "Cache: networked backend unavailable, using in-memory store");
                } else {
                    info!(%reason, "Cache: using in-memory store");
                }
                Self::fallback(reason)
            }
        };
        store.configured(config)
    }

    /// Build the store described by configuration without the liveness
    /// check, so nothing is written to the backend. Connection problems
    /// surface on first use instead.
    pub fn open(config: &CacheConfig) -> Self {
        let store = match Self::remote_backend(config) {
            Ok(backend) => Self::new(backend),
            Err(reason) => Self::fallback(reason),
        };
        store.configured(config)
    }

    fn remote_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, String> {
        let (Some(url), Some(token)) = (config.url.as_deref(), config.token.as_deref()) else {
            return Err("connection parameters absent".into());
        };
        if !config.has_remote() {
            return Err("connection parameters absent".into());
        }

        let backend = RestBackend::new(url, token).map_err(|e| e.to_string())?;
        Ok(Arc::new(backend))
    }

    fn fallback(reason: String) -> Self {
        let mut store = Self::in_memory();
        store.fallback_reason = Some(reason);
        store
    }

    fn configured(self, config: &CacheConfig) -> Self {
        let store = self.with_ttl(config.ttl.clone());
        match &config.scope {
            Some(scope) => store.with_scope(scope.clone()),
            None => store,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Why the networked backend is not in use, if it isn't.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// The TTL applied to writes in a namespace when none is given.
    pub fn ttl_for(&self, namespace: CacheNamespace) -> Duration {
        self.ttl.for_namespace(namespace)
    }

    /// The fully-qualified key string for a namespaced key.
    pub fn qualify(&self, namespace: CacheNamespace, key: &str) -> String {
        CacheKey::new(self.scope.as_deref(), namespace, key).to_string()
    }

    async fn read(&self, namespace: CacheNamespace, key: &str) -> Option<Value> {
        let full = self.qualify(namespace, key);
        match self.backend.get(&full).await {
            Ok(value) => value.map(decode_stored),
            Err(e) => {
                warn!(key = %full, error = %e, "Cache read failed, treating as miss");
                self.observer.on_error(namespace);
                None
            }
        }
    }

    /// Read the stored JSON value.
    pub async fn get_value(&self, namespace: CacheNamespace, key: &str) -> Option<Value> {
        let value = self.read(namespace, key).await;
        match value {
            Some(_) => self.observer.on_hit(namespace),
            None => self.observer.on_miss(namespace),
        }
        value
    }

    /// Read and deserialize a stored value. A value that does not match `T`
    /// is a miss.
    pub async fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        self.get_where(namespace, key, |_: &T| true).await
    }

    /// Like [`get`](Self::get), but a value rejected by `accept` is also a
    /// miss and is counted as one.
    pub async fn get_where<T, F>(&self, namespace: CacheNamespace, key: &str, accept: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let Some(value) = self.read(namespace, key).await else {
            self.observer.on_miss(namespace);
            return None;
        };

        match serde_json::from_value::<T>(value) {
            Ok(typed) if accept(&typed) => {
                self.observer.on_hit(namespace);
                Some(typed)
            }
            Ok(_) => {
                debug!(%namespace, key, "Cached value failed validation, treating as miss");
                self.observer.on_miss(namespace);
                None
            }
            Err(e) => {
                debug!(%namespace, key, error = %e, "Cached value has unexpected shape, treating as miss");
                self.observer.on_miss(namespace);
                None
            }
        }
    }

    /// Store a value. `ttl` overrides the namespace default.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        let full = self.qualify(namespace, key);
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %full, error = %e, "Cache value not serializable, write dropped");
                self.observer.on_error(namespace);
                return;
            }
        };

        let ttl = ttl.unwrap_or_else(|| self.ttl_for(namespace));
        match self.backend.set(&full, value, Some(ttl)).await {
            Ok(()) => self.observer.on_write(namespace),
            Err(e) => {
                warn!(key = %full, error = %e, "Cache write failed, dropped");
                self.observer.on_error(namespace);
            }
        }
    }

    pub async fn exists(&self, namespace: CacheNamespace, key: &str) -> bool {
        let full = self.qualify(namespace, key);
        match self.backend.exists(&full).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key = %full, error = %e, "Cache exists check failed");
                self.observer.on_error(namespace);
                false
            }
        }
    }

    pub async fn delete(&self, namespace: CacheNamespace, key: &str) {
        let full = self.qualify(namespace, key);
        if let Err(e) = self.backend.delete(&full).await {
            warn!(key = %full, error = %e, "Cache delete failed");
            self.observer.on_error(namespace);
        }
    }

    /// Store only if absent. Unlike `set`, failures are returned: callers
    /// building mutual exclusion on this must know the outcome.
    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend
            .set_if_absent(&self.qualify(namespace, key), value, ttl)
            .await
    }

    /// Increment a counter whose TTL starts with its first increment.
    pub async fn incr(
        &self,
        namespace: CacheNamespace,
        key: &str,
        ttl: Duration,
    ) -> Result<i64, CacheError> {
        self.backend.incr(&self.qualify(namespace, key), ttl).await
    }

    /// Describe whatever is stored under a fully-qualified key, without
    /// changing it or touching statistics.
    pub async fn inspect(&self, full_key: &str) -> Result<CacheInspection, CacheError> {
        let raw = self.backend.get(full_key).await?;
        Ok(inspect::describe(full_key, raw.as_ref()))
    }
}

/// Write, read back, and verify a sentinel value, then remove it.
async fn probe(backend: &dyn CacheBackend) -> Result<(), CacheError> {
    let nonce = uuid::Uuid::new_v4().to_string();
    let key = format!("{}:__probe__:{nonce}", CacheNamespace::Ops);
    let sentinel = serde_json::json!({ "probe": nonce });

    backend
        .set(&key, sentinel.clone(), Some(Duration::from_secs(30)))
        .await?;
    let read_back = backend.get(&key).await?;
    let _ = backend.delete(&key).await;

    match read_back {
        Some(value) if value == sentinel => Ok(()),
        Some(other) => Err(CacheError::ProbeFailed(format!(
            "sentinel mismatch: read back {other}"
        ))),
        None => Err(CacheError::ProbeFailed("sentinel not readable".into())),
    }
}

/// Parse a stored string once more when it looks like JSON text; anything
/// already structured is returned as-is.
pub(crate) fn decode_stored(value: Value) -> Value {
    match value {
        Value::String(s) if inspect::looks_like_json(&s) => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatherline_core::ManualClock;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingObserver {
        hits: AtomicU64,
        misses: AtomicU64,
        writes: AtomicU64,
        errors: AtomicU64,
    }

    impl CacheObserver for CountingObserver {
        fn on_hit(&self, _: CacheNamespace) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        fn on_miss(&self, _: CacheNamespace) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fn on_write(&self, _: CacheNamespace) {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        fn on_error(&self, _: CacheNamespace) {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A backend whose every call fails.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }
        async fn get(&self, _: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn set(&self, _: &str, _: Value, _: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn set_if_absent(&self, _: &str, _: Value, _: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn incr(&self, _: &str, _: Duration) -> Result<i64, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Connection("refused".into()))
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Page {
        url: String,
        content: String,
    }

    fn clocked_store() -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = CacheStore::new(Arc::new(InMemoryBackend::with_clock(clock.clone())));
        (store, clock)
    }

    #[tokio::test]
    async fn round_trip_then_expiry() {
        let (store, clock) = clocked_store();
        let page = Page {
            url: "https://example.com".into(),
            content: "hello".into(),
        };
        store
            .set(CacheNamespace::Scrape, "k1", &page, Some(Duration::from_secs(60)))
            .await;

        assert_eq!(store.get::<Page>(CacheNamespace::Scrape, "k1").await, Some(page));
        assert!(store.exists(CacheNamespace::Scrape, "k1").await);

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.get::<Page>(CacheNamespace::Scrape, "k1").await, None);
        assert!(!store.exists(CacheNamespace::Scrape, "k1").await);
    }

    #[tokio::test]
    async fn namespace_default_ttl_applies_when_unspecified() {
        let (store, clock) = clocked_store();
        store.set(CacheNamespace::DeepSearch, "q", &json!({"a": 1}), None).await;

        clock.advance(Duration::from_secs(59 * 60));
        assert!(store.exists(CacheNamespace::DeepSearch, "q").await);
        clock.advance(Duration::from_secs(2 * 60));
        assert!(!store.exists(CacheNamespace::DeepSearch, "q").await);
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let store = CacheStore::in_memory();
        store.set(CacheNamespace::Rag, "same", &json!("rag"), None).await;
        store.set(CacheNamespace::Scrape, "same", &json!("scrape"), None).await;

        assert_eq!(
            store.get_value(CacheNamespace::Rag, "same").await,
            Some(json!("rag"))
        );
        assert_eq!(
            store.get_value(CacheNamespace::Scrape, "same").await,
            Some(json!("scrape"))
        );
    }

    #[tokio::test]
    async fn scope_prefixes_keys() {
        let store = CacheStore::in_memory().with_scope("global");
        assert_eq!(
            store.qualify(CacheNamespace::Rag, "4525a018453d5765"),
            "global:rag:4525a018453d5765"
        );
    }

    #[tokio::test]
    async fn wrong_shape_is_a_miss() {
        let observer = Arc::new(CountingObserver::default());
        let store = CacheStore::in_memory().with_observer(observer.clone());
        store
            .set(CacheNamespace::Scrape, "k", &json!({"url": 42}), None)
            .await;

        assert_eq!(store.get::<Page>(CacheNamespace::Scrape, "k").await, None);
        assert_eq!(observer.misses.load(Ordering::Relaxed), 1);
        assert_eq!(observer.hits.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn rejected_value_is_a_miss() {
        let observer = Arc::new(CountingObserver::default());
        let store = CacheStore::in_memory().with_observer(observer.clone());
        store
            .set(CacheNamespace::Scrape, "k", &json!({"url": "u", "content": ""}), None)
            .await;

        let page = store
            .get_where(CacheNamespace::Scrape, "k", |p: &Page| !p.content.is_empty())
            .await;
        assert_eq!(page, None);
        assert_eq!(observer.hits.load(Ordering::Relaxed), 0);
        assert_eq!(observer.misses.load(Ordering::Relaxed), 1);

        let page = store.get::<Page>(CacheNamespace::Scrape, "k").await;
        assert!(page.is_some());
        assert_eq!(observer.hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stringified_json_is_parsed_once() {
        let store = CacheStore::in_memory();
        let text = serde_json::to_string(&json!({"url": "u", "content": "c"})).unwrap();
        store.set(CacheNamespace::Scrape, "k", &text, None).await;

        let page: Page = store.get(CacheNamespace::Scrape, "k").await.unwrap();
        assert_eq!(page.content, "c");

        // Plain strings are left alone.
        store.set(CacheNamespace::Ops, "s", "just text", None).await;
        assert_eq!(
            store.get_value(CacheNamespace::Ops, "s").await,
            Some(json!("just text"))
        );
    }

    #[tokio::test]
    async fn backend_failures_never_surface() {
        let observer = Arc::new(CountingObserver::default());
        let store = CacheStore::new(Arc::new(BrokenBackend)).with_observer(observer.clone());

        store.set(CacheNamespace::Rag, "k", &json!(1), None).await;
        assert_eq!(store.get_value(CacheNamespace::Rag, "k").await, None);
        assert!(!store.exists(CacheNamespace::Rag, "k").await);
        store.delete(CacheNamespace::Rag, "k").await;

        assert_eq!(observer.errors.load(Ordering::Relaxed), 4);
        assert_eq!(observer.misses.load(Ordering::Relaxed), 1);
        assert!(store.set_if_absent(CacheNamespace::Ops, "l", &1, Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn counters_track_hits_misses_and_writes() {
        let observer = Arc::new(CountingObserver::default());
        let store = CacheStore::in_memory().with_observer(observer.clone());

        assert_eq!(store.get_value(CacheNamespace::Rag, "k").await, None);
        store.set(CacheNamespace::Rag, "k", &json!({"content": "x"}), None).await;
        assert!(store.get_value(CacheNamespace::Rag, "k").await.is_some());

        assert_eq!(observer.misses.load(Ordering::Relaxed), 1);
        assert_eq!(observer.writes.load(Ordering::Relaxed), 1);
        assert_eq!(observer.hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn connect_without_parameters_falls_back_to_memory() {
        let config = CacheConfig {
            scope: Some("global".into()),
            ..CacheConfig::default()
        };
        let store = CacheStore::connect(&config).await;
        assert_eq!(store.backend_name(), "in_memory");
        assert!(store.fallback_reason().is_some());
        assert_eq!(store.qualify(CacheNamespace::Rag, "k"), "global:rag:k");

        store.set(CacheNamespace::Rag, "k", &json!({"content": "x"}), None).await;
        assert!(store.exists(CacheNamespace::Rag, "k").await);
    }

    #[tokio::test]
    async fn connect_with_unreachable_backend_falls_back_to_memory() {
        let config = CacheConfig {
            // Port 9 (discard) on localhost: connection refused.
            url: Some("http://127.0.0.1:9".into()),
            token: Some("tok".into()),
            ..CacheConfig::default()
        };
        let store = CacheStore::connect(&config).await;
        assert_eq!(store.backend_name(), "in_memory");
        assert!(store.fallback_reason().is_some());
    }

    #[tokio::test]
    async fn open_skips_the_liveness_check() {
        let config = CacheConfig {
            url: Some("http://127.0.0.1:9".into()),
            token: Some("tok".into()),
            scope: Some("global".into()),
            ..CacheConfig::default()
        };
        let store = CacheStore::open(&config);
        assert_eq!(store.backend_name(), "rest");
        assert!(store.fallback_reason().is_none());
        assert_eq!(store.qualify(CacheNamespace::Rag, "k"), "global:rag:k");

        // The unreachable backend is only noticed when it is used.
        assert!(store.inspect("global:rag:k").await.is_err());

        let local = CacheStore::open(&CacheConfig::default());
        assert_eq!(local.backend_name(), "in_memory");
        assert!(local.fallback_reason().is_some());
    }

    #[tokio::test]
    async fn probe_accepts_a_working_backend() {
        assert!(probe(&InMemoryBackend::new()).await.is_ok());
        assert!(probe(&BrokenBackend).await.is_err());
    }

    #[tokio::test]
    async fn inspect_does_not_count_or_mutate() {
        let observer = Arc::new(CountingObserver::default());
        let store = CacheStore::in_memory().with_observer(observer.clone());
        store.set(CacheNamespace::Rag, "k", &json!({"content": "x"}), None).await;

        let report = store.inspect("rag:k").await.unwrap();
        assert!(report.exists);
        assert_eq!(report.value_type, "object");
        assert_eq!(observer.hits.load(Ordering::Relaxed), 0);
        assert!(store.exists(CacheNamespace::Rag, "k").await);
    }
}
