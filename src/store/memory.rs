//! In-memory job store.
//!
//! Backs tests and local development; the production deployment uses
//! [`super::RedisJobStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use super::{JobStore, StoreError};

/// Job store backed by an in-process map.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("store mutex poisoned").len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryJobStore::new();

        store
            .put("job:1:bills", "[]".to_string())
            .await
            .expect("put should work");
        assert_eq!(
            store.get("job:1:bills").await.expect("get should work"),
            Some("[]".to_string())
        );

        store.delete("job:1:bills").await.expect("delete should work");
        assert_eq!(store.get("job:1:bills").await.expect("get should work"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryJobStore::new();

        store.put("k", "a".to_string()).await.expect("put");
        store.put("k", "b".to_string()).await.expect("put");

        assert_eq!(store.get("k").await.expect("get"), Some("b".to_string()));
        assert_eq!(store.len(), 1);
    }
}
