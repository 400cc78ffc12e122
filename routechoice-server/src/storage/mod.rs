//! Key-value persistence behind one narrow async interface.
//!
//! Everything the service persists (configuration documents, sessions) is a
//! JSON value under a string key. Adapters are picked at startup; the
//! [`LayeredStore`] puts a process-lifetime memory cache in front of the
//! durable one.
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod file;
mod layered;
mod memory;
mod rest;
#[cfg(test)]
pub(crate) mod testing;

pub use file::FileBackend;
pub use layered::LayeredStore;
pub use memory::MemoryBackend;
pub use rest::RestKvBackend;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{key}` holds malformed JSON: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("key-value service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("key-value service answered {status} for `{key}`")]
    Status { key: String, status: u16 },
}

/// A store of JSON documents addressed by key.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the value under `key`, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the stored value is
    /// not valid JSON.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects or cannot complete the write.
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Remove `key`; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot complete the removal.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
