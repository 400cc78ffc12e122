//! Test doubles for storage.
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{KeyValueBackend, MemoryBackend, StorageError};

/// Durable backend that fails every call and counts the attempts.
#[derive(Debug, Default)]
pub struct BrokenBackend {
    pub calls: AtomicUsize,
}

impl BrokenBackend {
    fn failure(&self, key: &str) -> StorageError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StorageError::Status {
            key: key.to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl KeyValueBackend for BrokenBackend {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Err(self.failure(key))
    }

    async fn set(&self, key: &str, _value: &Value) -> Result<(), StorageError> {
        Err(self.failure(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        Err(self.failure(key))
    }
}


/// Memory-backed durable store whose writes and deletes fail for chosen keys.
#[derive(Debug, Default)]
pub struct FailingWrites {
    pub inner: MemoryBackend,
    failing: Vec<String>,
}

impl FailingWrites {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            inner: MemoryBackend::new(),
            failing: failing.iter().map(ToString::to_string).collect(),
        }
    }

    fn check(&self, key: &str) -> Result<(), StorageError> {
        if self.failing.iter().any(|failing| failing == key) {
            return Err(StorageError::Status {
                key: key.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for FailingWrites {
    fn name(&self) -> &'static str {
        "failing-writes"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check(key)?;
        self.inner.delete(key).await
    }
}
