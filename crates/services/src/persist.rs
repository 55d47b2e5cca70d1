//! Fire-and-forget persistence over the key-value store.
//!
//! Read failures and malformed values degrade to "absent"; write failures are
//! logged and dropped. Nothing here returns an error to the session.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use storage::repository::KeyValueStore;
use tracing::warn;

#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl StateStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Raw stored value, or `None` if missing or unreadable.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        match self.kv.get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "failed to read persisted value");
                None
            }
        }
    }

    pub async fn set_raw(&self, key: &str, value: &str) {
        if let Err(err) = self.kv.set(key, value).await {
            warn!(key, error = %err, "failed to persist value");
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(err) = self.kv.remove(key).await {
            warn!(key, error = %err, "failed to remove persisted value");
        }
    }

    /// Decoded value, or `None` if missing, unreadable, or malformed.
    pub async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "discarding malformed persisted value");
                None
            }
        }
    }

    pub async fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, &raw).await,
            Err(err) => warn!(key, error = %err, "failed to serialize value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn malformed_json_reads_as_absent() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.set("k", "{ nope").await.unwrap();
        let store = StateStore::new(repo);
        let value: Option<Vec<u32>> = store.load_json("k").await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn json_round_trips() {
        let store = StateStore::new(Arc::new(InMemoryRepository::new()));
        store.save_json("k", &vec![1_u32, 2]).await;
        let value: Option<Vec<u32>> = store.load_json("k").await;
        assert_eq!(value, Some(vec![1, 2]));
        store.remove("k").await;
        assert_eq!(store.get_raw("k").await, None);
    }
}
