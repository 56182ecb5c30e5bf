//! Query and extraction cache
//!
//! Key-value lookup keyed by normalized query fingerprints, fronting the
//! retrieval layer. Redis in deployment, moka in-process otherwise.

pub mod key;
pub mod memory;
pub mod redis;
pub mod service;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::config::{CacheBackend, Config};
use crate::errors::Result;

pub use key::{fingerprint, normalize_query, Namespace};
pub use memory::MemoryCache;
pub use self::redis::RedisCache;
pub use service::{CacheService, CacheStats};

/// Minimal key-value operations the cache policy needs
#[async_trait]
pub trait QueryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Remaining lifetime; `None` for a missing key or one without expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn used_memory_bytes(&self) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend
pub async fn connect_backend(config: &Config) -> Result<Arc<dyn QueryCache>> {
    match config.cache.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisCache::connect(&config.redis).await?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new(config.cache.max_entries))),
    }
}

/// Open the configured backend, degrading to in-process when Redis is unreachable
pub async fn connect_or_fallback(config: &Config) -> Arc<dyn QueryCache> {
    match connect_backend(config).await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(error = %e, "cache backend unavailable, using in-process cache");
            Arc::new(MemoryCache::new(config.cache.max_entries))
        }
    }
}
