use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{KeyValueBackend, StorageError};

/// One pretty-printed JSON file per key under a data directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written document.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    write_counter: AtomicU64,
}

impl FileBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

/// Map a key onto a portable file stem.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`,
/// which keeps distinct keys distinct and rules out path separators and dots.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    if encoded.is_empty() {
        encoded.push('%');
    }
    encoded
}

fn io_error(key: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let bytes = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(key, err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| io_error(key, err))?;

        let target = self.path_for(key);
        let sequence = self.write_counter.fetch_add(1, Ordering::Relaxed);
        let staging = target.with_extension(format!("json.{}.{sequence}.tmp", std::process::id()));
        tokio::fs::write(&staging, body)
            .await
            .map_err(|err| io_error(key, err))?;
        if let Err(err) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_error(key, err));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(key, err)),
        }
    }
}
