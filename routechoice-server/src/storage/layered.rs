use serde_json::Value;
use std::sync::Arc;

use super::{KeyValueBackend, MemoryBackend, StorageError};

/// Memory cache in front of an optional durable backend.
///
/// Reads consult the cache first and fill it from the durable backend on a
/// miss. [`set`](Self::set) lands in the cache before the durable backend is
/// tried, so a process keeps reading its own writes even while the durable
/// backend is failing. [`commit`](Self::commit) and [`delete`](Self::delete)
/// touch the cache only after the durable backend accepted the change.
pub struct LayeredStore {
    memory: MemoryBackend,
    durable: Option<Arc<dyn KeyValueBackend>>,
}

impl LayeredStore {
    #[must_use]
    pub fn new(durable: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            memory: MemoryBackend::new(),
            durable: Some(durable),
        }
    }

    #[must_use]
    pub fn memory_only() -> Self {
        Self {
            memory: MemoryBackend::new(),
            durable: None,
        }
    }

    /// Name of the durable backend, `memory` when there is none.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.durable
            .as_ref()
            .map_or_else(|| self.memory.name(), |durable| durable.name())
    }

    /// Read `key`, degrading to "absent" when the durable backend fails.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Ok(Some(cached)) = self.memory.get(key).await {
            return Some(cached);
        }
        let durable = self.durable.as_ref()?;
        match durable.get(key).await {
            Ok(Some(value)) => {
                let _ = self.memory.set(key, &value).await;
                Some(value)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("{} read of `{key}` failed: {err}", durable.name());
                None
            }
        }
    }

    /// Write `key` to the cache and then the durable backend.
    ///
    /// # Errors
    ///
    /// Returns the durable backend's error. The cached value is kept either way.
    pub async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.memory.set(key, value).await?;
        match &self.durable {
            Some(durable) => durable.set(key, value).await,
            None => Ok(()),
        }
    }

    /// Write `key` to the durable backend, caching it only once that succeeds.
    ///
    /// # Errors
    ///
    /// Returns the durable backend's error, leaving the cache untouched.
    pub async fn commit(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        if let Some(durable) = &self.durable {
            durable.set(key, value).await?;
        }
        self.memory.set(key, value).await
    }

    /// Remove `key` from the durable backend, then from the cache.
    ///
    /// # Errors
    ///
    /// Returns the durable backend's error. The key stays cached and stored.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Some(durable) = &self.durable {
            durable.delete(key).await?;
        }
        self.memory.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{BrokenBackend, FailingWrites};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn failed_durable_writes_stay_readable() {
        let broken = Arc::new(BrokenBackend::default());
        let store = LayeredStore::new(broken.clone());
        assert!(store.get("k").await.is_none());
        assert!(store.set("k", &json!(1)).await.is_err());
        assert_eq!(store.get("k").await, Some(json!(1)));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn misses_fill_the_cache() {
        let durable = Arc::new(MemoryBackend::new());
        durable.set("k", &json!({"a": 1})).await.unwrap();
        let store = LayeredStore::new(durable.clone());
        assert_eq!(store.get("k").await, Some(json!({"a": 1})));

        durable.delete("k").await.unwrap();
        assert_eq!(store.get("k").await, Some(json!({"a": 1})));

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn memory_only_store_names_itself() {
        let store = LayeredStore::memory_only();
        assert_eq!(store.backend_name(), "memory");
        store.set("k", &json!("v")).await.unwrap();
        assert_eq!(store.get("k").await, Some(json!("v")));
    }

    #[tokio::test]
    async fn rejected_commits_are_not_cached() {
        let durable = Arc::new(FailingWrites::new(&["k"]));
        let store = LayeredStore::new(durable.clone());
        assert!(store.commit("k", &json!("rejected")).await.is_err());
        assert!(store.get("k").await.is_none());

        store.commit("other", &json!("kept")).await.unwrap();
        assert_eq!(durable.inner.get("other").await.unwrap(), Some(json!("kept")));
        assert_eq!(store.get("other").await, Some(json!("kept")));
    }

    #[tokio::test]
    async fn failed_deletes_leave_the_value_in_place() {
        let durable = Arc::new(FailingWrites::new(&["k"]));
        durable.inner.set("k", &json!(1)).await.unwrap();
        let store = LayeredStore::new(durable.clone());
        assert_eq!(store.get("k").await, Some(json!(1)));

        assert!(store.delete("k").await.is_err());
        assert_eq!(store.get("k").await, Some(json!(1)));
        assert_eq!(durable.inner.get("k").await.unwrap(), Some(json!(1)));
    }
}
