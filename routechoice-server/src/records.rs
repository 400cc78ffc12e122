//! Append-only JSON Lines log of finalized participant records.
use routechoice_core::ParticipantRecord;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::storage::StorageError;

pub struct RecordsLog {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    writer: Mutex<()>,
}

impl RecordsLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the file cannot be
    /// opened or written.
    pub async fn append(&self, record: &ParticipantRecord) -> Result<(), StorageError> {
        let key = record.session.session_id.clone();
        let mut line = serde_json::to_vec(record).map_err(|source| StorageError::Encode {
            key: key.clone(),
            source,
        })?;
        line.push(b'\n');

        let io_error = |source| StorageError::Io {
            key: key.clone(),
            source,
        };
        let _guard = self.writer.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(&line).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}
