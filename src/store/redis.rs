//! Redis-backed job store.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{JobStore, StoreError};

/// Job store backed by Redis string keys.
pub struct RedisJobStore {
    redis: ConnectionManager,
}

impl RedisJobStore {
    /// Connects to Redis and creates a new store.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }

    /// Creates a store from an existing connection manager.
    ///
    /// Useful when sharing a connection pool with the queues.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl JobStore for RedisJobStore {
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
