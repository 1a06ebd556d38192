//! Prediction cache.
//!
//! Two layers:
//!
//! - [`CacheStore`]: a backing key-value store (in-process [`memory::MemoryStore`], shared
//!   [`redis_store::RedisStore`], or [`NoopStore`] when caching is disabled). Stores report their
//!   failures honestly.
//! - [`PredictionCache`]: the adapter the scoring engine talks to. Every store call is bounded
//!   by a timeout, and store failures are absorbed: a failed or slow read is a miss, a failed
//!   write is logged and reported as `false`. Nothing here can fail a prediction request.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{instrument, trace, warn};

use crate::config::{CacheBackend, CacheConfig};
use crate::metrics;
use crate::scoring::types::CacheKey;

pub mod memory;
pub mod redis_store;

/// Errors raised by a backing store
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cached value for '{key}' is not a number: {value}")]
    Corrupt { key: String, value: String },

    #[error("cache misconfigured: {0}")]
    Config(String),
}

/// A backing key-value store for predictions
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and metrics
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<f64>, CacheError>;

    async fn set(&self, key: &str, value: f64) -> Result<(), CacheError>;
}

/// Store used when caching is disabled: always misses, discards writes
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
    fn backend(&self) -> &'static str {
        "disabled"
    }

    async fn get(&self, _key: &str) -> Result<Option<f64>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: f64) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Create the configured backing store.
///
/// This is the single point where cache configuration turns into a store instance.
pub fn create_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(memory::MemoryStore::new(config.max_capacity, config.time_to_live)),
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::Config("redis backend selected but cache.redis_url is not set".to_string()))?;
            Arc::new(redis_store::RedisStore::open(url)?)
        }
        CacheBackend::Disabled => Arc::new(NoopStore),
    };
    Ok(store)
}

/// Failure-absorbing, latency-bounded view over a [`CacheStore`]
#[derive(Clone)]
pub struct PredictionCache {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl PredictionCache {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Look up a cached prediction. Store errors and timeouts count as a miss.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get(&self, key: &CacheKey) -> Option<f64> {
        match tokio::time::timeout(self.timeout, self.store.get(key.as_str())).await {
            Ok(Ok(Some(value))) => {
                trace!("Cache hit");
                metrics::record_cache_hit();
                Some(value)
            }
            Ok(Ok(None)) => {
                trace!("Cache miss");
                metrics::record_cache_miss();
                None
            }
            Ok(Err(e)) => {
                warn!(backend = self.backend(), "Cache read failed, treating as miss: {}", e);
                metrics::record_cache_error("get");
                metrics::record_cache_miss();
                None
            }
            Err(_) => {
                warn!(backend = self.backend(), "Cache read timed out after {:?}, treating as miss", self.timeout);
                metrics::record_cache_error("get");
                metrics::record_cache_miss();
                None
            }
        }
    }

    /// Store a prediction. Returns whether the write was acknowledged by the store.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn set(&self, key: &CacheKey, value: f64) -> bool {
        match tokio::time::timeout(self.timeout, self.store.set(key.as_str(), value)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(backend = self.backend(), "Cache write failed: {}", e);
                metrics::record_cache_error("set");
                false
            }
            Err(_) => {
                warn!(backend = self.backend(), "Cache write timed out after {:?}", self.timeout);
                metrics::record_cache_error("set");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::types::FeatureRecord;
    use crate::test_utils::{FailingStore, StalledStore};

    fn key() -> CacheKey {
        CacheKey::new(
            "test",
            &FeatureRecord {
                comprehension: 0.8,
                attention: 0.6,
                focus: 0.7,
                retention: 0.9,
                engagement_time: 45,
            },
        )
    }

    #[tokio::test]
    async fn test_roundtrip_through_memory_store() {
        let cache = PredictionCache::new(Arc::new(memory::MemoryStore::new(None, None)), Duration::from_millis(100));

        assert_eq!(cache.get(&key()).await, None);
        assert!(cache.set(&key(), 72.345).await);
        assert_eq!(cache.get(&key()).await, Some(72.345));
    }

    #[tokio::test]
    async fn test_store_errors_are_misses() {
        let cache = PredictionCache::new(Arc::new(FailingStore), Duration::from_millis(100));

        assert_eq!(cache.get(&key()).await, None);
        assert!(!cache.set(&key(), 1.0).await);
    }

    #[tokio::test]
    async fn test_slow_store_is_bounded_by_timeout() {
        let cache = PredictionCache::new(Arc::new(StalledStore), Duration::from_millis(20));

        let started = std::time::Instant::now();
        assert_eq!(cache.get(&key()).await, None);
        assert!(!cache.set(&key(), 1.0).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_noop_store_never_hits() {
        let cache = PredictionCache::new(Arc::new(NoopStore), Duration::from_millis(100));

        assert!(cache.set(&key(), 1.0).await);
        assert_eq!(cache.get(&key()).await, None);
        assert_eq!(cache.backend(), "disabled");
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: None,
            ..Default::default()
        };
        assert!(matches!(create_store(&config), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_create_store_by_backend() {
        let memory = create_store(&CacheConfig::default()).unwrap();
        assert_eq!(memory.backend(), "memory");

        let disabled = create_store(&CacheConfig {
            backend: CacheBackend::Disabled,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(disabled.backend(), "disabled");
    }
}
