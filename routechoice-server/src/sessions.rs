//! Session persistence keyed by participant session id.
use routechoice_core::SessionRecord;
use std::sync::Arc;

use crate::storage::{LayeredStore, StorageError};

pub struct SessionStore {
    store: Arc<LayeredStore>,
    prefix: String,
}

impl SessionStore {
    #[must_use]
    pub fn new(store: Arc<LayeredStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Storage key for a session id. Choice and survey logging share it.
    #[must_use]
    pub fn key(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.prefix)
    }

    /// Load a session; unreadable records count as absent.
    pub async fn load(&self, session_id: &str) -> Option<SessionRecord> {
        let key = self.key(session_id);
        let value = self.store.get(&key).await?;
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                log::warn!("ignoring unreadable session `{key}`: {err}");
                None
            }
        }
    }

    /// Persist a session, overwriting any previous record.
    ///
    /// Durable failures are logged and the session lives on in memory.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record cannot be encoded.
    pub async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let key = self.key(record.session_id());
        let value = serde_json::to_value(record).map_err(|source| StorageError::Encode {
            key: key.clone(),
            source,
        })?;
        if let Err(err) = self.store.set(&key, &value).await {
            log::warn!(
                "durable write of `{key}` to {} failed, keeping it in memory: {err}",
                self.store.backend_name()
            );
        }
        Ok(())
    }

    /// Remove a session from storage.
    ///
    /// # Errors
    ///
    /// Returns the durable backend's error; the session then stays loadable.
    pub async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        let key = self.key(session_id);
        self.store.delete(&key).await.inspect_err(|err| {
            log::warn!("durable delete of `{key}` failed: {err}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::BrokenBackend;
    use chrono::Utc;
    use routechoice_core::Session;

    #[tokio::test]
    async fn sessions_survive_a_failing_durable_backend() {
        let store = Arc::new(LayeredStore::new(Arc::new(BrokenBackend::default())));
        let sessions = SessionStore::new(store, "session:");
        let record = SessionRecord::Active(Session::new("p-1", Utc::now()));

        assert!(sessions.load("p-1").await.is_none());
        sessions.save(&record).await.unwrap();
        assert_eq!(sessions.load("p-1").await, Some(record.clone()));

        assert!(sessions.delete("p-1").await.is_err());
        assert_eq!(sessions.load("p-1").await, Some(record));
    }

    #[tokio::test]
    async fn deleted_sessions_are_gone() {
        let sessions = SessionStore::new(Arc::new(LayeredStore::memory_only()), "session:");
        let record = SessionRecord::Active(Session::new("p-1", Utc::now()));
        sessions.save(&record).await.unwrap();

        sessions.delete("p-1").await.unwrap();
        assert!(sessions.load("p-1").await.is_none());
    }

    #[tokio::test]
    async fn keys_carry_the_prefix() {
        let sessions = SessionStore::new(Arc::new(LayeredStore::memory_only()), "study-a:");
        assert_eq!(sessions.key("xyz"), "study-a:xyz");
    }
}
