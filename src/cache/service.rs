//! Cache policy on top of a `QueryCache` backend
//!
//! Every operation here is best-effort: backend failures are logged and the
//! caller carries on uncached.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::key::{file_fingerprint, Namespace};
use super::QueryCache;
use crate::cli::config::Config;
use crate::errors::Result;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Cache usage summary
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub memory_mb: f64,
    pub threshold_mb: f64,
    pub laws_entries: usize,
    pub procedures_entries: usize,
    pub extraction_entries: usize,
}

/// Cache service fronting retrieval and text extraction
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn QueryCache>,
    expiration: Duration,
    threshold_bytes: u64,
    evict_below: Duration,
    telemetry: Option<TelemetryCollector>,
}

impl CacheService {
    /// Build from configuration
    pub fn new(backend: Arc<dyn QueryCache>, config: &Config) -> Self {
        Self::with_settings(
            backend,
            Duration::from_secs(config.redis.expiration_secs),
            config.redis.memory_threshold_mb,
            Duration::from_secs(config.cache.evict_below_secs),
        )
    }

    /// Build with explicit TTL, memory threshold and eviction horizon
    pub fn with_settings(
        backend: Arc<dyn QueryCache>,
        expiration: Duration,
        threshold_mb: u64,
        evict_below: Duration,
    ) -> Self {
        Self {
            backend,
            expiration,
            threshold_bytes: threshold_mb.saturating_mul(1024 * 1024),
            evict_below,
            telemetry: None,
        }
    }

    /// Attach a telemetry collector for hit/miss counters
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Underlying backend
    pub fn backend(&self) -> &Arc<dyn QueryCache> {
        &self.backend
    }

    /// Look up a cached JSON value for `query`; corrupt entries are deleted
    pub async fn lookup_json<T: DeserializeOwned>(&self, ns: Namespace, query: &str) -> Option<T> {
        let key = ns.query_key(query);

        let raw = match self.backend.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_miss(ns);
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "cache read failed");
                self.record_miss(ns);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key = %key, "cache hit");
                if let Some(telemetry) = &self.telemetry {
                    telemetry.cache_hit(ns.prefix());
                }
                Some(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "discarding corrupt cache entry");
                if let Err(e) = self.backend.delete(&key).await {
                    tracing::warn!(error = %e, key = %key, "failed to delete corrupt entry");
                }
                self.record_miss(ns);
                None
            }
        }
    }

    /// Store a JSON value for `query`, evicting first when over the memory threshold
    pub async fn store_json<T: Serialize>(&self, ns: Namespace, query: &str, value: &T) {
        let key = ns.query_key(query);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "cache value not serializable");
                return;
            }
        };
        self.write(&key, &raw).await;
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Only a failure of `compute` itself is surfaced.
    pub async fn get_or_compute_json<T, F, Fut>(&self, ns: Namespace, query: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.lookup_json(ns, query).await {
            return Ok(hit);
        }

        let value = compute().await?;
        self.store_json(ns, query, &value).await;
        Ok(value)
    }

    /// Cached text previously extracted from `path`
    pub async fn cached_extraction(&self, path: &Path) -> Option<String> {
        let key = self.extraction_key(path).await?;
        match self.backend.get(&key).await {
            Ok(Some(text)) => {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.cache_hit(Namespace::ExtractedText.prefix());
                }
                Some(text)
            }
            Ok(None) => {
                self.record_miss(Namespace::ExtractedText);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "extraction cache read failed");
                None
            }
        }
    }

    /// Remember text extracted from `path`
    pub async fn cache_extraction(&self, path: &Path, text: &str) {
        if let Some(key) = self.extraction_key(path).await {
            self.write(&key, text).await;
        }
    }

    async fn extraction_key(&self, path: &Path) -> Option<String> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "cannot fingerprint file");
                return None;
            }
        };
        let modified = tokio::fs::metadata(path)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        Some(Namespace::ExtractedText.key(&file_fingerprint(&contents, modified)))
    }

    async fn write(&self, key: &str, value: &str) {
        if self.over_threshold().await {
            match self.evict_stale().await {
                Ok(evicted) => tracing::info!(evicted, "cache over memory threshold, evicted stale keys"),
                Err(e) => tracing::warn!(error = %e, "cache eviction failed"),
            }
        }

        if let Err(e) = self.backend.set_ex(key, value, self.expiration).await {
            tracing::warn!(error = %e, key = %key, "cache write failed");
        }
    }

    async fn over_threshold(&self) -> bool {
        match self.backend.used_memory_bytes().await {
            Ok(bytes) => bytes > self.threshold_bytes,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read cache memory usage");
                false
            }
        }
    }

    /// Current cache memory in MB; 0.0 when it cannot be read
    pub async fn memory_usage_mb(&self) -> f64 {
        match self.backend.used_memory_bytes().await {
            Ok(bytes) => bytes as f64 / BYTES_PER_MB,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read cache memory usage");
                0.0
            }
        }
    }

    /// Delete managed keys whose remaining TTL is below the eviction horizon
    pub async fn evict_stale(&self) -> Result<usize> {
        let mut evicted = 0;

        for ns in Namespace::ALL {
            for key in self.backend.keys(&format!("{}:", ns.prefix())).await? {
                let stale = matches!(
                    self.backend.ttl(&key).await?,
                    Some(remaining) if remaining < self.evict_below
                );
                if stale {
                    self.backend.delete(&key).await?;
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            if let Some(telemetry) = &self.telemetry {
                telemetry.record(TelemetryEvent::CacheEviction {
                    evicted,
                    timestamp: std::time::Instant::now(),
                });
            }
        }

        Ok(evicted)
    }

    /// Usage summary across managed namespaces
    pub async fn stats(&self) -> Result<CacheStats> {
        let count = |ns: Namespace| async move {
            self.backend
                .keys(&format!("{}:", ns.prefix()))
                .await
                .map(|keys| keys.len())
        };

        Ok(CacheStats {
            backend: self.backend.backend_name().to_string(),
            memory_mb: self.memory_usage_mb().await,
            threshold_mb: self.threshold_bytes as f64 / BYTES_PER_MB,
            laws_entries: count(Namespace::LawsQuery).await?,
            procedures_entries: count(Namespace::ProceduresQuery).await?,
            extraction_entries: count(Namespace::ExtractedText).await?,
        })
    }

    fn record_miss(&self, ns: Namespace) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.cache_miss(ns.prefix());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::errors::LexiError;
    use async_trait::async_trait;

    fn service(backend: Arc<dyn QueryCache>) -> CacheService {
        CacheService::with_settings(
            backend,
            Duration::from_secs(3600),
            25,
            Duration::from_secs(86_400),
        )
    }

    /// Backend whose every call fails
    struct BrokenCache;

    #[async_trait]
    impl QueryCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn used_memory_bytes(&self) -> Result<u64> {
            Err(LexiError::CacheError("down".into()))
        }
        async fn ping(&self) -> Result<()> {
            Err(LexiError::CacheError("down".into()))
        }
        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_store_then_lookup_normalized() {
        let telemetry = TelemetryCollector::new();
        let cache = service(Arc::new(MemoryCache::default())).with_telemetry(telemetry.clone());

        assert!(cache.lookup_json::<Vec<String>>(Namespace::LawsQuery, "Bail Act").await.is_none());
        cache
            .store_json(Namespace::LawsQuery, "Bail Act", &vec!["s 4".to_string()])
            .await;

        let hit: Option<Vec<String>> = cache.lookup_json(Namespace::LawsQuery, "  bail   act ").await;
        assert_eq!(hit, Some(vec!["s 4".to_string()]));

        let stats = telemetry.get_stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_deleted() {
        let backend = Arc::new(MemoryCache::default());
        let key = Namespace::LawsQuery.query_key("q");
        backend.set_ex(&key, "{not json", Duration::from_secs(60)).await.unwrap();

        let cache = service(backend.clone());
        assert!(cache.lookup_json::<Vec<String>>(Namespace::LawsQuery, "q").await.is_none());
        assert_eq!(backend.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_broken_backend_is_swallowed() {
        let cache = service(Arc::new(BrokenCache));
        assert!(cache.lookup_json::<Vec<String>>(Namespace::LawsQuery, "q").await.is_none());
        cache.store_json(Namespace::LawsQuery, "q", &vec![1, 2]).await;
        assert_eq!(cache.memory_usage_mb().await, 0.0);

        let value = cache
            .get_or_compute_json(Namespace::LawsQuery, "q", || async { Ok(vec![7]) })
            .await
            .unwrap();
        assert_eq!(value, vec![7]);
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once() {
        let cache = service(Arc::new(MemoryCache::default()));
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute_json(Namespace::ProceduresQuery, "appeal", || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec!["form 1".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["form 1".to_string()]);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evict_stale_keeps_fresh_keys() {
        let backend = Arc::new(MemoryCache::default());
        backend.set_ex("extracted_text:old", "a", Duration::from_secs(60)).await.unwrap();
        backend.set_ex("laws_query:fresh", "b", Duration::from_secs(172_800)).await.unwrap();
        backend.set_ex("unmanaged:x", "c", Duration::from_secs(1)).await.unwrap();

        let cache = service(backend.clone());
        assert_eq!(cache.evict_stale().await.unwrap(), 1);
        assert!(backend.get("extracted_text:old").await.unwrap().is_none());
        assert!(backend.get("laws_query:fresh").await.unwrap().is_some());
        assert!(backend.get("unmanaged:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_over_threshold_evicts() {
        let backend = Arc::new(MemoryCache::default());
        backend
            .set_ex("extracted_text:stale", &"x".repeat(2 * 1024 * 1024), Duration::from_secs(30))
            .await
            .unwrap();

        let cache = CacheService::with_settings(
            backend.clone(),
            Duration::from_secs(3600),
            1,
            Duration::from_secs(86_400),
        );
        cache.store_json(Namespace::LawsQuery, "q", &vec![1]).await;

        assert!(backend.get("extracted_text:stale").await.unwrap().is_none());
        assert!(cache.lookup_json::<Vec<i32>>(Namespace::LawsQuery, "q").await.is_some());
    }

    #[tokio::test]
    async fn test_extraction_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("affidavit.png");
        std::fs::write(&path, b"fake image bytes").unwrap();

        let cache = service(Arc::new(MemoryCache::default()));
        assert!(cache.cached_extraction(&path).await.is_none());
        cache.cache_extraction(&path, "sworn statement").await;
        assert_eq!(cache.cached_extraction(&path).await.as_deref(), Some("sworn statement"));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.extraction_entries, 1);
        assert_eq!(stats.backend, "memory");
    }
}
