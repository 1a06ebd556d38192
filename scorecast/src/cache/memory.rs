//! In-process prediction store backed by moka.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use super::{CacheError, CacheStore};

/// In-process store. Capacity and time-to-live are optional store properties.
pub struct MemoryStore {
    inner: Cache<String, f64>,
}

impl MemoryStore {
    pub fn new(max_capacity: Option<u64>, time_to_live: Option<Duration>) -> Self {
        let mut builder = Cache::<String, f64>::builder();
        if let Some(capacity) = max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(ttl) = time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self { inner: builder.build() }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<f64>, CacheError> {
        Ok(self.inner.get(key).await)
    }

    async fn set(&self, key: &str, value: f64) -> Result<(), CacheError> {
        self.inner.insert(key.to_string(), value).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let store = MemoryStore::new(Some(10), None);

        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", 1.5).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(1.5));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let store = MemoryStore::new(None, None);

        store.set("a", 1.0).await.unwrap();
        store.set("a", 2.0).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(2.0));
    }

    #[tokio::test]
    async fn test_time_to_live_expires_entries() {
        let store = MemoryStore::new(None, Some(Duration::from_millis(50)));

        store.set("a", 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
