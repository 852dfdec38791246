//! Key-value byte storage used for best-effort local persistence.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Volatile store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_get_set() {
        let store = MemoryKvStore::new();
        assert!(store.get("todos").await.unwrap().is_none());

        store.set("todos", b"[]").await.unwrap();
        assert_eq!(store.get("todos").await.unwrap(), Some(b"[]".to_vec()));

        store.set("todos", b"[1]").await.unwrap();
        assert_eq!(store.get("todos").await.unwrap(), Some(b"[1]".to_vec()));
    }
}
