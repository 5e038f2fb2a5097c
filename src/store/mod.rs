//! Shared key-value job store.
//!
//! Pipeline stages hand intermediate artifacts to each other through
//! job-scoped keys of the form `job:<jobId>:<artifact>`. Each key is written
//! by exactly one stage and read by exactly one downstream stage; the
//! consuming stage deletes the key once its own output is durably written.
//!
//! The store is a trait so stages can be wired against Redis in production
//! and an in-memory map in tests.

pub mod keys;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use self::redis::RedisJobStore;
pub use memory::MemoryJobStore;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Failed to serialize or deserialize a stored value.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store for job-scoped artifacts.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Writes a value, overwriting any existing entry.
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Reads a value; `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Serializes `value` as JSON and writes it under `key`.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn JobStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let serialized = serde_json::to_string(value)?;
    store.put(key, serialized).await
}

/// Reads `key` and deserializes it from JSON; `None` if absent.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn JobStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Blob {
        value: u32,
    }

    #[tokio::test]
    async fn test_put_json_get_json_roundtrip() {
        let store = MemoryJobStore::new();

        put_json(&store, "job:x:blob", &Blob { value: 7 })
            .await
            .expect("put should work");

        let loaded: Option<Blob> = get_json(&store, "job:x:blob").await.expect("get should work");
        assert_eq!(loaded, Some(Blob { value: 7 }));
    }

    #[tokio::test]
    async fn test_get_json_absent_key() {
        let store = MemoryJobStore::new();
        let loaded: Option<Blob> = get_json(&store, "job:x:missing")
            .await
            .expect("get should work");
        assert!(loaded.is_none());
    }
}
