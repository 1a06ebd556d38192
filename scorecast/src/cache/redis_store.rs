//! Shared prediction store backed by Redis.
//!
//! Scores are stored as plain decimal strings under their cache key, without expiry. The
//! connection is established lazily on first use so the service starts even while Redis is
//! down; once connected, the connection manager reconnects on its own.

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::info;

use super::{CacheError, CacheStore};

pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Validate the URL and prepare a client. Does not connect.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to redis prediction cache");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(key).await?;
        payload
            .map(|value| {
                value.parse::<f64>().map_err(|_| CacheError::Corrupt {
                    key: key.to_string(),
                    value,
                })
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: f64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value.to_string()).await?;
        Ok(())
    }
}
