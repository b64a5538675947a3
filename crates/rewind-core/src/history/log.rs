//! History log: records, queries and reverts document history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::HistoryConfig;
use crate::error::{RewindError, RewindResult};
use crate::traits::DocumentStore;
use crate::types::{
    document_id, without_fields, Document, Filter, Patch, SortDirection, SortKey, UpdateOptions,
};

use super::diff::detect_changes;
use super::entry::{ChangeSet, HistoryEntry, HistoryOperation, HistorySummary};

const FIELD_COLLECTION: &str = "collection";
const FIELD_DOCUMENT_ID: &str = "documentId";
const FIELD_VERSION: &str = "version";

/// Options for [`HistoryLog::get_history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQueryOptions {
    /// Order by version.
    pub sort: SortDirection,
    /// Maximum number of entries; 0 means unbounded.
    pub limit: usize,
}

impl Default for HistoryQueryOptions {
    fn default() -> Self {
        Self {
            sort: SortDirection::Descending,
            limit: 0,
        }
    }
}

impl HistoryQueryOptions {
    pub fn ascending() -> Self {
        Self {
            sort: SortDirection::Ascending,
            limit: 0,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A lazy, restartable query over one document's history.
///
/// Nothing is read until [`HistoryQuery::stream`] is polled; every call to
/// `stream` starts a fresh read.
#[derive(Clone)]
pub struct HistoryQuery {
    store: Arc<dyn DocumentStore>,
    history_collection: String,
    filter: Filter,
    options: HistoryQueryOptions,
}

impl HistoryQuery {
    /// Stream the entries in the requested order.
    pub fn stream(&self) -> BoxStream<'static, RewindResult<HistoryEntry>> {
        let store = Arc::clone(&self.store);
        let collection = self.history_collection.clone();
        let filter = self.filter.clone();
        let sort = vec![SortKey {
            field: FIELD_VERSION.to_string(),
            direction: self.options.sort,
        }];
        let limit = Some(self.options.limit).filter(|l| *l > 0);

        stream::once(async move { store.find(&collection, &filter, &sort, limit).await })
            .map(|result| {
                let entries: Vec<RewindResult<HistoryEntry>> = match result {
                    Ok(docs) => docs.into_iter().map(HistoryEntry::from_document).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(entries)
            })
            .flatten()
            .boxed()
    }

    /// Read every entry into a vector.
    pub async fn to_vec(&self) -> RewindResult<Vec<HistoryEntry>> {
        self.stream().try_collect().await
    }
}

/// Records an append-only history for the documents of one collection.
///
/// The owning record-access layer calls `track_*` after each committed
/// mutation. Version numbers are assigned read-then-write; callers must
/// serialize mutations per document, and the unique
/// `(collection, documentId, version)` index turns a lost race into a
/// duplicate-key error instead of a silent gap or overwrite.
pub struct HistoryLog {
    store: Arc<dyn DocumentStore>,
    collection: String,
    config: HistoryConfig,
}

impl HistoryLog {
    /// Create a history log for documents of `collection`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            config,
        }
    }

    /// Create a history log with the default configuration.
    pub fn with_defaults(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self::new(store, collection, HistoryConfig::default())
    }

    /// The tracked collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Install the unique index on `(collection, documentId, version)`.
    pub async fn ensure_indexes(&self) -> RewindResult<()> {
        let fields = vec![
            FIELD_COLLECTION.to_string(),
            FIELD_DOCUMENT_ID.to_string(),
            FIELD_VERSION.to_string(),
        ];
        self.store
            .ensure_unique_index(&self.config.collection, &fields)
            .await
    }

    fn document_filter(&self, document_id: &str) -> Filter {
        Filter::and(vec![
            Filter::eq(FIELD_COLLECTION, self.collection.as_str()),
            Filter::eq(FIELD_DOCUMENT_ID, document_id),
        ])
    }

    fn version_filter(&self, document_id: &str, version: u32) -> Filter {
        Filter::and(vec![
            Filter::eq(FIELD_COLLECTION, self.collection.as_str()),
            Filter::eq(FIELD_DOCUMENT_ID, document_id),
            Filter::eq(FIELD_VERSION, version),
        ])
    }

    fn actor_or_default(&self, actor: Option<&str>) -> String {
        actor
            .map(str::to_string)
            .unwrap_or_else(|| self.config.system_actor.clone())
    }

    fn require_id(record: &Document) -> RewindResult<String> {
        document_id(record).ok_or_else(|| {
            RewindError::internal("tracked record has no '_id'; track after the store write")
        })
    }

    /// Highest recorded version of a document, 0 if it has no history.
    pub async fn latest_version(&self, document_id: &str) -> RewindResult<u32> {
        let latest = self
            .store
            .find_one(
                &self.config.collection,
                &self.document_filter(document_id),
                &[SortKey::desc(FIELD_VERSION)],
            )
            .await?;

        match latest.as_ref().and_then(|doc| doc.get(FIELD_VERSION)) {
            None => Ok(0),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    RewindError::internal(format!(
                        "history of '{}' holds an invalid version: {}",
                        document_id, value
                    ))
                }),
        }
    }

    async fn append(
        &self,
        document_id: String,
        version: u32,
        operation: HistoryOperation,
        snapshot: Document,
        changes: Option<ChangeSet>,
        actor: Option<&str>,
    ) -> RewindResult<HistoryEntry> {
        let entry = HistoryEntry {
            collection: self.collection.clone(),
            document_id,
            version,
            operation,
            snapshot,
            changes,
            actor: self.actor_or_default(actor),
            recorded_at: Utc::now(),
        };

        self.store
            .insert(&self.config.collection, entry.to_document()?)
            .await?;

        debug!(
            collection = %self.collection,
            document_id = %entry.document_id,
            version = entry.version,
            operation = %entry.operation,
            actor = %entry.actor,
            "Recorded history entry"
        );
        Ok(entry)
    }

    /// Record the creation of `record` as version 1.
    pub async fn track_creation(
        &self,
        record: &Document,
        actor: Option<&str>,
    ) -> RewindResult<HistoryEntry> {
        let id = Self::require_id(record)?;
        self.append(id, 1, HistoryOperation::Create, record.clone(), None, actor)
            .await
    }

    /// Record an update from `old_record` to `new_record`.
    ///
    /// Always writes a new version, even when no field changed.
    pub async fn track_update(
        &self,
        old_record: &Document,
        new_record: &Document,
        actor: Option<&str>,
    ) -> RewindResult<HistoryEntry> {
        let id = Self::require_id(new_record).or_else(|_| Self::require_id(old_record))?;
        let version = self.latest_version(&id).await? + 1;
        let changes = detect_changes(old_record, new_record, &self.config.identity_fields);
        self.append(
            id,
            version,
            HistoryOperation::Update,
            new_record.clone(),
            Some(changes),
            actor,
        )
        .await
    }

    /// Record the deletion of `record`, keeping its last state as the snapshot.
    pub async fn track_deletion(
        &self,
        record: &Document,
        actor: Option<&str>,
    ) -> RewindResult<HistoryEntry> {
        let id = Self::require_id(record)?;
        let version = self.latest_version(&id).await? + 1;
        self.append(id, version, HistoryOperation::Delete, record.clone(), None, actor)
            .await
    }

    /// Query the history of a document.
    pub fn get_history(&self, document_id: &str, options: HistoryQueryOptions) -> HistoryQuery {
        HistoryQuery {
            store: Arc::clone(&self.store),
            history_collection: self.config.collection.clone(),
            filter: self.document_filter(document_id),
            options,
        }
    }

    /// The full entry at a version, if recorded.
    pub async fn get_entry(
        &self,
        document_id: &str,
        version: u32,
    ) -> RewindResult<Option<HistoryEntry>> {
        self.store
            .find_one(
                &self.config.collection,
                &self.version_filter(document_id, version),
                &[],
            )
            .await?
            .map(HistoryEntry::from_document)
            .transpose()
    }

    /// The snapshot at a version. `Ok(None)` means no such version.
    pub async fn get_version(
        &self,
        document_id: &str,
        version: u32,
    ) -> RewindResult<Option<Document>> {
        Ok(self
            .get_entry(document_id, version)
            .await?
            .map(|entry| entry.snapshot))
    }

    /// The newest entry recorded at or before `timestamp`.
    pub async fn get_at_time(
        &self,
        document_id: &str,
        timestamp: DateTime<Utc>,
    ) -> RewindResult<Option<HistoryEntry>> {
        let entries = self
            .get_history(document_id, HistoryQueryOptions::ascending())
            .to_vec()
            .await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.recorded_at <= timestamp)
            .max_by_key(|entry| entry.version))
    }

    /// Field changes between two recorded versions.
    pub async fn compare_versions(
        &self,
        document_id: &str,
        from_version: u32,
        to_version: u32,
    ) -> RewindResult<ChangeSet> {
        let from = self
            .get_version(document_id, from_version)
            .await?
            .ok_or_else(|| RewindError::version_not_found(document_id, from_version))?;
        let to = self
            .get_version(document_id, to_version)
            .await?
            .ok_or_else(|| RewindError::version_not_found(document_id, to_version))?;
        Ok(detect_changes(&from, &to, &self.config.identity_fields))
    }

    /// Summary of a document's history, `None` if it has none.
    pub async fn get_summary(&self, document_id: &str) -> RewindResult<Option<HistorySummary>> {
        let entries = self
            .get_history(document_id, HistoryQueryOptions::ascending())
            .to_vec()
            .await?;
        Ok(HistorySummary::from_entries(document_id, &entries))
    }

    /// Restore the live document to the state recorded at `version`.
    ///
    /// The reversion is itself an update: it produces a new version whose
    /// actor is marked as a system reversion. History is never rewritten.
    pub async fn revert_to_version(
        &self,
        document_id: &str,
        version: u32,
        actor: Option<&str>,
    ) -> RewindResult<Document> {
        let entry = self
            .get_entry(document_id, version)
            .await?
            .ok_or_else(|| RewindError::version_not_found(document_id, version))?;

        let id_filter = Filter::id(document_id);
        let current = self
            .store
            .find_one(&self.collection, &id_filter, &[])
            .await?
            .ok_or_else(|| RewindError::not_found(document_id))?;

        let identity = &self.config.identity_fields;
        let target = without_fields(&entry.snapshot, identity);
        let mut patch = Patch::set_all(target.clone());
        for field in current.keys() {
            if !target.contains_key(field) && !identity.iter().any(|f| f == field) {
                patch = patch.and_unset(field.clone());
            }
        }

        self.store
            .update_one(&self.collection, &id_filter, &patch, UpdateOptions::default())
            .await?;

        let reverted = self
            .store
            .find_one(&self.collection, &id_filter, &[])
            .await?
            .ok_or_else(|| RewindError::not_found(document_id))?;

        let label = match actor {
            Some(actor) => format!("{}:{}", self.config.revert_actor, actor),
            None => self.config.revert_actor.clone(),
        };
        let recorded = self.track_update(&current, &reverted, Some(&label)).await?;

        info!(
            collection = %self.collection,
            document_id,
            reverted_to = version,
            new_version = recorded.version,
            "Reverted document to earlier version"
        );
        Ok(reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::traits::MockDocumentStore;
    use crate::types::from_value;
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, HistoryLog) {
        let store = Arc::new(MemoryStore::new());
        let log = HistoryLog::with_defaults(store.clone(), "users");
        (store, log)
    }

    #[tokio::test]
    async fn test_versions_are_sequential() {
        let (_, log) = setup();
        let v1 = from_value(json!({"_id": "d", "name": "A"}));
        let v2 = from_value(json!({"_id": "d", "name": "B"}));

        assert_eq!(log.track_creation(&v1, None).await.unwrap().version, 1);
        assert_eq!(log.track_update(&v1, &v2, None).await.unwrap().version, 2);
        assert_eq!(log.track_deletion(&v2, None).await.unwrap().version, 3);
        assert_eq!(log.latest_version("d").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_default_actor_is_system() {
        let (_, log) = setup();
        let doc = from_value(json!({"_id": "d"}));
        let entry = log.track_creation(&doc, None).await.unwrap();
        assert_eq!(entry.actor, "system");
        let entry = log.track_update(&doc, &doc, Some("alice")).await.unwrap();
        assert_eq!(entry.actor, "alice");
    }

    #[tokio::test]
    async fn test_record_without_id_is_rejected() {
        let (_, log) = setup();
        let err = log
            .track_creation(&from_value(json!({"name": "A"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RewindError::Internal(_)));
    }

    #[tokio::test]
    async fn test_history_is_scoped_per_collection() {
        let store = Arc::new(MemoryStore::new());
        let users = HistoryLog::with_defaults(store.clone(), "users");
        let orders = HistoryLog::with_defaults(store.clone(), "orders");
        let doc = from_value(json!({"_id": "same-id"}));

        users.track_creation(&doc, None).await.unwrap();
        let entry = orders.track_creation(&doc, None).await.unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(
            users
                .get_history("same-id", HistoryQueryOptions::default())
                .to_vec()
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unique_index_surfaces_racing_writers() {
        let (_, log) = setup();
        log.ensure_indexes().await.unwrap();
        let doc = from_value(json!({"_id": "d"}));
        log.track_creation(&doc, None).await.unwrap();

        // A second creation claims version 1 again.
        let err = log.track_creation(&doc, None).await.unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn test_get_history_limit_and_restart() {
        let (_, log) = setup();
        let doc = from_value(json!({"_id": "d", "n": 0}));
        log.track_creation(&doc, None).await.unwrap();
        for n in 1..=4 {
            let next = from_value(json!({"_id": "d", "n": n}));
            log.track_update(&doc, &next, None).await.unwrap();
        }

        let query = log.get_history("d", HistoryQueryOptions::default().with_limit(2));
        let first: Vec<u32> = query.to_vec().await.unwrap().iter().map(|e| e.version).collect();
        assert_eq!(first, vec![5, 4]);

        // Restarting the query reads again from the beginning.
        let again: Vec<u32> = query
            .stream()
            .map(|e| e.unwrap().version)
            .collect()
            .await;
        assert_eq!(again, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_get_version_missing_is_none() {
        let (_, log) = setup();
        assert!(log.get_version("nope", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_at_time() {
        let (_, log) = setup();
        let doc = from_value(json!({"_id": "d", "n": 1}));
        assert!(log.get_at_time("d", Utc::now()).await.unwrap().is_none());

        log.track_creation(&doc, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        log.track_update(&doc, &from_value(json!({"_id": "d", "n": 2})), None)
            .await
            .unwrap();

        let at_cutoff = log.get_at_time("d", cutoff).await.unwrap().unwrap();
        assert_eq!(at_cutoff.version, 1);
        let now = log.get_at_time("d", Utc::now()).await.unwrap().unwrap();
        assert_eq!(now.version, 2);
    }

    #[tokio::test]
    async fn test_get_at_time_survives_clock_stepping_back() {
        let (store, log) = setup();
        let t0 = Utc::now();
        let stamps = [
            t0,
            t0 + chrono::Duration::hours(1),
            t0 - chrono::Duration::hours(1),
        ];
        for (i, recorded_at) in stamps.into_iter().enumerate() {
            let entry = HistoryEntry {
                collection: "users".to_string(),
                document_id: "d".to_string(),
                version: i as u32 + 1,
                operation: HistoryOperation::Update,
                snapshot: from_value(json!({"_id": "d", "n": i})),
                changes: None,
                actor: "system".to_string(),
                recorded_at,
            };
            store.insert("history", entry.to_document().unwrap()).await.unwrap();
        }

        let found = log.get_at_time("d", t0).await.unwrap().unwrap();
        assert_eq!(found.version, 3);
    }

    #[tokio::test]
    async fn test_oversized_stored_version_is_rejected() {
        let (store, log) = setup();
        store
            .insert(
                "history",
                from_value(json!({
                    "collection": "users",
                    "documentId": "d",
                    "version": 5_000_000_000u64,
                })),
            )
            .await
            .unwrap();

        let err = log.latest_version("d").await.unwrap_err();
        assert!(matches!(err, RewindError::Internal(_)));
    }

    #[tokio::test]
    async fn test_compare_versions_and_summary() {
        let (_, log) = setup();
        let a = from_value(json!({"_id": "d", "name": "A", "age": 1}));
        let b = from_value(json!({"_id": "d", "name": "B", "age": 1}));
        log.track_creation(&a, None).await.unwrap();
        log.track_update(&a, &b, None).await.unwrap();

        let changes = log.compare_versions("d", 1, 2).await.unwrap();
        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["name"]);

        let err = log.compare_versions("d", 1, 9).await.unwrap_err();
        assert!(err.is_not_found());

        let summary = log.get_summary("d").await.unwrap().unwrap();
        assert_eq!(summary.total_versions, 2);
        assert_eq!(summary.latest_version, 2);
        assert_eq!(summary.updates, 1);
        assert!(!summary.deleted);
        assert!(log.get_summary("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revert_unsets_fields_added_later() {
        let (store, log) = setup();
        let id = store
            .insert("users", from_value(json!({"name": "A"})))
            .await
            .unwrap();
        let created = store
            .find_one("users", &Filter::id(id.clone()), &[])
            .await
            .unwrap()
            .unwrap();
        log.track_creation(&created, None).await.unwrap();

        store
            .update_one(
                "users",
                &Filter::id(id.clone()),
                &Patch::set("name", "B").and_set("email", "b@x"),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        let updated = store
            .find_one("users", &Filter::id(id.clone()), &[])
            .await
            .unwrap()
            .unwrap();
        log.track_update(&created, &updated, None).await.unwrap();

        let reverted = log.revert_to_version(&id, 1, Some("bob")).await.unwrap();
        assert_eq!(reverted["name"], json!("A"));
        assert!(reverted.get("email").is_none());
        assert_eq!(reverted["_id"], json!(id));

        let entry = log.get_entry(&id, 3).await.unwrap().unwrap();
        assert_eq!(entry.operation, HistoryOperation::Update);
        assert_eq!(entry.actor, "system:revert:bob");
        let changes = entry.changes.unwrap();
        assert_eq!(changes["email"].to, None);
    }

    #[tokio::test]
    async fn test_revert_missing_version_or_document() {
        let (store, log) = setup();
        let err = log.revert_to_version("ghost", 1, None).await.unwrap_err();
        assert!(matches!(err, RewindError::NotFound { version: Some(1), .. }));

        let id = store
            .insert("users", from_value(json!({"name": "A"})))
            .await
            .unwrap();
        let doc = store
            .find_one("users", &Filter::id(id.clone()), &[])
            .await
            .unwrap()
            .unwrap();
        log.track_creation(&doc, None).await.unwrap();
        store.delete_one("users", &Filter::id(id.clone())).await.unwrap();
        log.track_deletion(&doc, None).await.unwrap();

        let err = log.revert_to_version(&id, 1, None).await.unwrap_err();
        assert!(matches!(err, RewindError::NotFound { version: None, .. }));
        assert_eq!(log.latest_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut mock = MockDocumentStore::new();
        mock.expect_find_one()
            .returning(|_, _, _| Err(RewindError::connection("store unreachable")));
        mock.expect_insert().never();

        let log = HistoryLog::with_defaults(Arc::new(mock), "users");
        let doc = from_value(json!({"_id": "d"}));
        let err = log.track_update(&doc, &doc, None).await.unwrap_err();
        assert!(matches!(err, RewindError::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_insert_failure_propagates_from_creation() {
        let mut mock = MockDocumentStore::new();
        mock.expect_insert()
            .times(1)
            .returning(|_, _| Err(RewindError::persistence("write rejected")));

        let log = HistoryLog::with_defaults(Arc::new(mock), "users");
        let result = log
            .track_creation(&from_value(json!({"_id": "d"})), None)
            .await;
        tokio_test::assert_err!(result);
    }
}
