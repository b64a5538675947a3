//! Persisted ledger of applied migrations.

use std::sync::Arc;

use crate::error::RewindResult;
use crate::traits::DocumentStore;
use crate::types::{Filter, SortKey};

use super::record::MigrationRecord;

/// The single source of truth for which migrations are applied.
///
/// A unique index on `name` keeps two processes from recording the same
/// migration twice.
pub struct MigrationLedger {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl MigrationLedger {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Install the unique index on `name`.
    pub async fn ensure_indexes(&self) -> RewindResult<()> {
        self.store
            .ensure_unique_index(&self.collection, &["name".to_string()])
            .await
    }

    /// All records, ascending by version.
    pub async fn list(&self) -> RewindResult<Vec<MigrationRecord>> {
        self.store
            .find(
                &self.collection,
                &Filter::all(),
                &[SortKey::asc("version"), SortKey::asc("appliedAt")],
                None,
            )
            .await?
            .into_iter()
            .map(MigrationRecord::from_document)
            .collect()
    }

    /// The record for a migration name, if applied.
    pub async fn get(&self, name: &str) -> RewindResult<Option<MigrationRecord>> {
        self.store
            .find_one(&self.collection, &Filter::eq("name", name), &[])
            .await?
            .map(MigrationRecord::from_document)
            .transpose()
    }

    /// Record a migration as applied.
    pub async fn insert(&self, record: &MigrationRecord) -> RewindResult<()> {
        self.store
            .insert(&self.collection, record.to_document()?)
            .await?;
        Ok(())
    }

    /// Remove the record of a migration. Returns whether one existed.
    pub async fn remove(&self, name: &str) -> RewindResult<bool> {
        let result = self
            .store
            .delete_one(&self.collection, &Filter::eq("name", name))
            .await?;
        Ok(result.deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn record(name: &str, version: i64) -> MigrationRecord {
        MigrationRecord {
            name: name.to_string(),
            version,
            description: String::new(),
            applied_at: Utc::now(),
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_ledger_lifecycle() {
        let ledger = MigrationLedger::new(Arc::new(MemoryStore::new()), "migrations");
        ledger.ensure_indexes().await.unwrap();

        ledger.insert(&record("b", 2)).await.unwrap();
        ledger.insert(&record("a", 1)).await.unwrap();

        let names: Vec<String> = ledger.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let err = ledger.insert(&record("a", 5)).await.unwrap_err();
        assert!(err.is_duplicate_key());

        assert!(ledger.remove("a").await.unwrap());
        assert!(!ledger.remove("a").await.unwrap());
        assert!(ledger.get("a").await.unwrap().is_none());
        assert!(ledger.get("b").await.unwrap().is_some());
    }
}
