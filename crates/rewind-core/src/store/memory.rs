//! In-memory document store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::collection::Collection;
use crate::error::RewindResult;
use crate::traits::DocumentStore;
use crate::types::{
    BulkWriteResult, DeleteResult, Document, Filter, Patch, SortKey, UpdateOptions, UpdateResult,
    WriteOp,
};

/// Process-local [`DocumentStore`] backed by a map of collections.
///
/// Used for tests and for embedding the engine without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the collections that exist so far.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn read<T>(&self, collection: &str, f: impl FnOnce(&Collection) -> T) -> T {
        let guard = self.collections.read().await;
        match guard.get(collection) {
            Some(coll) => f(coll),
            None => f(&Collection::new(collection)),
        }
    }

    async fn write<T>(&self, collection: &str, f: impl FnOnce(&mut Collection) -> T) -> T {
        let mut guard = self.collections.write().await;
        let coll = guard
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection));
        f(coll)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc: Document) -> RewindResult<String> {
        self.write(collection, |c| c.insert(doc)).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
    ) -> RewindResult<Option<Document>> {
        Ok(self.read(collection, |c| c.find_one(filter, sort)).await)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> RewindResult<Vec<Document>> {
        Ok(self.read(collection, |c| c.find(filter, sort, limit)).await)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult> {
        self.write(collection, |c| c.update(filter, patch, options, false))
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult> {
        self.write(collection, |c| c.update(filter, patch, options, true))
            .await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult> {
        Ok(self.write(collection, |c| c.delete(filter, false)).await)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult> {
        Ok(self.write(collection, |c| c.delete(filter, true)).await)
    }

    async fn bulk_apply(
        &self,
        collection: &str,
        ops: Vec<WriteOp>,
    ) -> RewindResult<BulkWriteResult> {
        self.write(collection, |c| c.bulk(ops)).await
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> RewindResult<u64> {
        Ok(self.read(collection, |c| c.count(filter)).await)
    }

    async fn ensure_unique_index(&self, collection: &str, fields: &[String]) -> RewindResult<()> {
        self.write(collection, |c| c.add_unique_index(fields).map(|_| ()))
            .await
    }
}
