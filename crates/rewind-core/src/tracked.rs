//! Record-access layer that keeps a history log in step with its collection.

use std::sync::Arc;

use tracing::debug;

use crate::config::HistoryConfig;
use crate::error::{RewindError, RewindResult};
use crate::history::HistoryLog;
use crate::traits::DocumentStore;
use crate::types::{Document, Filter, Patch, UpdateOptions};

/// A collection whose mutations are recorded in a [`HistoryLog`].
///
/// Every mutation writes the business record first and tracks it afterwards.
/// Updates that modify nothing record nothing.
pub struct TrackedCollection {
    store: Arc<dyn DocumentStore>,
    log: HistoryLog,
}

impl TrackedCollection {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        config: HistoryConfig,
    ) -> Self {
        let log = HistoryLog::new(Arc::clone(&store), collection, config);
        Self { store, log }
    }

    pub fn with_defaults(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self::new(store, collection, HistoryConfig::default())
    }

    /// The history of this collection.
    pub fn history(&self) -> &HistoryLog {
        &self.log
    }

    pub fn name(&self) -> &str {
        self.log.collection()
    }

    async fn require(&self, id: &str) -> RewindResult<Document> {
        self.get(id)
            .await?
            .ok_or_else(|| RewindError::not_found(id))
    }

    /// The live document, if it exists.
    pub async fn get(&self, id: &str) -> RewindResult<Option<Document>> {
        self.store.find_one(self.name(), &Filter::id(id), &[]).await
    }

    /// Insert a document and record version 1.
    pub async fn create(&self, doc: Document, actor: Option<&str>) -> RewindResult<Document> {
        let id = self.store.insert(self.name(), doc).await?;
        let stored = self.require(&id).await?;
        self.log.track_creation(&stored, actor).await?;
        Ok(stored)
    }

    /// Apply `patch` to a document and record the change.
    pub async fn update(
        &self,
        id: &str,
        patch: &Patch,
        actor: Option<&str>,
    ) -> RewindResult<Document> {
        let before = self.require(id).await?;
        let result = self
            .store
            .update_one(self.name(), &Filter::id(id), patch, UpdateOptions::default())
            .await?;
        if result.modified == 0 {
            debug!(collection = %self.name(), document_id = id, "Update changed nothing");
            return Ok(before);
        }

        let after = self.require(id).await?;
        self.log.track_update(&before, &after, actor).await?;
        Ok(after)
    }

    /// Delete a document and record its final state.
    pub async fn delete(&self, id: &str, actor: Option<&str>) -> RewindResult<Document> {
        let before = self.require(id).await?;
        self.store.delete_one(self.name(), &Filter::id(id)).await?;
        self.log.track_deletion(&before, actor).await?;
        Ok(before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryOperation, HistoryQueryOptions};
    use crate::store::MemoryStore;
    use crate::types::{from_value, ID_FIELD};
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_update_records_nothing() {
        let users = TrackedCollection::with_defaults(Arc::new(MemoryStore::new()), "users");
        let created = users
            .create(from_value(json!({"name": "A"})), Some("alice"))
            .await
            .unwrap();
        let id = created[ID_FIELD].as_str().unwrap().to_string();

        users.update(&id, &Patch::set("name", "A"), None).await.unwrap();
        assert_eq!(users.history().latest_version(&id).await.unwrap(), 1);

        users.update(&id, &Patch::set("name", "B"), None).await.unwrap();
        assert_eq!(users.history().latest_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_non_string_id_commits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let users = TrackedCollection::with_defaults(store.clone(), "users");

        let err = users
            .create(from_value(json!({"_id": 7, "name": "A"})), None)
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(store.count_documents("users", &Filter::all()).await.unwrap(), 0);
        assert_eq!(store.count_documents("history", &Filter::all()).await.unwrap(), 0);

        let created = users
            .create(from_value(json!({"_id": "7", "name": "A"})), None)
            .await
            .unwrap();
        assert_eq!(created[ID_FIELD], json!("7"));
        assert_eq!(users.history().latest_version("7").await.unwrap(), 1);
        users.update("7", &Patch::set("name", "B"), None).await.unwrap();
        assert_eq!(users.history().latest_version("7").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let users = TrackedCollection::with_defaults(Arc::new(MemoryStore::new()), "users");
        let err = users
            .update("missing", &Patch::set("name", "B"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(users.delete("missing", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_keeps_last_state() {
        let users = TrackedCollection::with_defaults(Arc::new(MemoryStore::new()), "users");
        let created = users
            .create(from_value(json!({"name": "A"})), None)
            .await
            .unwrap();
        let id = created[ID_FIELD].as_str().unwrap().to_string();

        users.delete(&id, Some("bob")).await.unwrap();
        assert!(users.get(&id).await.unwrap().is_none());

        let history = users
            .history()
            .get_history(&id, HistoryQueryOptions::default())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(history[0].operation, HistoryOperation::Delete);
        assert_eq!(history[0].snapshot["name"], json!("A"));
        assert_eq!(history[0].actor, "bob");
    }
}
